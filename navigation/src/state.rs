use saferoute_protocol::Destination;
use saferoute_protocol::LocationSample;
use saferoute_protocol::RouteCandidate;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    Searching,
    RouteSelected,
    Navigating,
}

impl SessionState {
    /// The session transition table. Staying in the same state is not a
    /// transition and is handled by the caller.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Searching)
                | (Searching, RouteSelected)
                | (RouteSelected, Searching)
                | (RouteSelected, Navigating)
                // A new destination abandons the current navigation.
                | (Navigating, Searching)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::RouteSelected => "route_selected",
            SessionState::Navigating => "navigating",
        };
        f.write_str(label)
    }
}

/// One navigation attempt, from destination selection to stop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavigationSession {
    pub state: SessionState,
    pub destination: Option<Destination>,
    pub selected_route: Option<RouteCandidate>,
    pub last_known_location: Option<LocationSample>,
}

impl NavigationSession {
    /// A fresh idle session that remembers where the device last was.
    pub(crate) fn restart(&self) -> Self {
        Self {
            last_known_location: self.last_known_location.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::SessionState::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn navigating_is_only_reachable_from_a_selected_route() {
        let reachable: Vec<SessionState> = [Idle, Searching, RouteSelected, Navigating]
            .into_iter()
            .filter(|from| from.can_transition_to(Navigating))
            .collect();
        assert_eq!(reachable, vec![RouteSelected]);
    }

    #[test]
    fn every_state_can_return_to_idle() {
        for from in [Idle, Searching, RouteSelected, Navigating] {
            assert!(from.can_transition_to(Idle), "{from} -> idle");
        }
    }

    #[test]
    fn search_results_need_a_search() {
        assert!(!Idle.can_transition_to(RouteSelected));
        assert!(!Navigating.can_transition_to(RouteSelected));
        assert!(Searching.can_transition_to(RouteSelected));
    }

    #[test]
    fn restart_keeps_only_the_location() {
        let session = NavigationSession {
            state: Navigating,
            destination: Some(saferoute_protocol::Destination::from_map_pick(
                saferoute_protocol::Coordinate::new(40.7128, -74.006),
            )),
            selected_route: None,
            last_known_location: Some(LocationSample::new(
                saferoute_protocol::Coordinate::new(41.8397, -87.6343),
                std::time::UNIX_EPOCH,
            )),
        };

        let fresh = session.restart();

        assert_eq!(fresh.state, Idle);
        assert_eq!(fresh.destination, None);
        assert_eq!(fresh.last_known_location, session.last_known_location);
    }
}
