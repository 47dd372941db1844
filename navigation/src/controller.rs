use crate::error::SessionError;
use crate::link::ChannelLink;
use crate::location::LocationSource;
use crate::ranking::preferred_route;
use crate::search::RouteQuery;
use crate::search::RouteSearch;
use crate::state::NavigationSession;
use crate::state::SessionState;
use saferoute_channel::ConnectivityError;
use saferoute_protocol::Destination;
use saferoute_protocol::LocationSample;
use saferoute_protocol::RouteCandidate;
use saferoute_protocol::events::OutboundEvent;
use saferoute_protocol::events::StartNavigation;
use saferoute_protocol::events::StopNavigation;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// What the presentation layer renders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSnapshot {
    pub session: NavigationSession,
    /// Routes from the latest search for the current destination.
    pub candidates: Vec<RouteCandidate>,
    pub connectivity_error: Option<ConnectivityError>,
}

/// A search started by [`NavigationSessionController::begin_search`]. Only
/// the newest pending search can complete.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingSearch {
    epoch: u64,
    pub query: RouteQuery,
}

pub struct NavigationSessionController {
    session: NavigationSession,
    candidates: Vec<RouteCandidate>,
    connectivity_error: Option<ConnectivityError>,
    /// Bumped whenever in-flight search results would no longer apply.
    search_epoch: u64,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Default for NavigationSessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationSessionController {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            session: NavigationSession::default(),
            candidates: Vec::new(),
            connectivity_error: None,
            search_epoch: 0,
            snapshot_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    pub fn candidates(&self) -> &[RouteCandidate] {
        &self.candidates
    }

    pub fn connectivity_error(&self) -> Option<&ConnectivityError> {
        self.connectivity_error.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            candidates: self.candidates.clone(),
            connectivity_error: self.connectivity_error.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Replaces the destination. Any selection and pending search results
    /// for the previous destination are dropped.
    pub fn set_destination(&mut self, destination: Option<Destination>) {
        if self.session.state == SessionState::Navigating {
            warn!("destination changed while navigating, abandoning the session locally");
        }
        self.invalidate_search();
        let next = if destination.is_some() {
            SessionState::Searching
        } else {
            SessionState::Idle
        };
        if let Some(destination) = &destination {
            info!(destination = %destination.display_label(), "destination set");
        }
        self.session.destination = destination;
        self.force_state(next);
        self.publish();
    }

    pub async fn search_routes(
        &mut self,
        search: &dyn RouteSearch,
    ) -> Result<RouteCandidate, SessionError> {
        let pending = self.begin_search()?;
        let result = search.search(&pending.query).await;
        self.complete_search(pending, result)
    }

    /// First half of [`Self::search_routes`] for callers that cannot hold the
    /// controller across the collaborator's await.
    pub fn begin_search(&mut self) -> Result<PendingSearch, SessionError> {
        let Some(destination) = self.session.destination.clone() else {
            return Err(SessionError::NoDestination);
        };
        if self.session.state == SessionState::Navigating {
            return Err(self.invalid(SessionState::Searching));
        }
        self.invalidate_search();
        self.force_state(SessionState::Searching);
        self.publish();
        let query = RouteQuery {
            origin: self
                .session
                .last_known_location
                .as_ref()
                .map(|sample| sample.coordinate),
            destination,
        };
        debug!(epoch = self.search_epoch, ?query, "route search started");
        Ok(PendingSearch {
            epoch: self.search_epoch,
            query,
        })
    }

    pub fn complete_search(
        &mut self,
        pending: PendingSearch,
        result: anyhow::Result<Vec<RouteCandidate>>,
    ) -> Result<RouteCandidate, SessionError> {
        if pending.epoch != self.search_epoch {
            debug!(
                epoch = pending.epoch,
                current = self.search_epoch,
                "discarding stale route search results"
            );
            return Err(SessionError::StaleSearch);
        }
        let candidates = match result {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "route search failed");
                return Err(SessionError::RouteSearch(err));
            }
        };
        let Some(index) = preferred_route(&candidates) else {
            info!("route search returned no candidates");
            return Err(SessionError::NoRoutes);
        };
        let selected = candidates[index].clone();
        info!(
            count = candidates.len(),
            route = selected.id(),
            risk = selected.risk_tier().label(),
            "routes received"
        );
        self.candidates = candidates;
        self.session.selected_route = Some(selected.clone());
        self.force_state(SessionState::RouteSelected);
        self.publish();
        Ok(selected)
    }

    pub fn select_route(&mut self, route_id: &str) -> Result<(), SessionError> {
        let Some(route) = self
            .candidates
            .iter()
            .find(|route| route.id() == route_id)
            .cloned()
        else {
            return Err(SessionError::UnknownRoute {
                route_id: route_id.to_string(),
            });
        };
        if self.session.state != SessionState::RouteSelected {
            return Err(self.invalid(SessionState::RouteSelected));
        }
        debug!(route = route_id, "route selected");
        self.session.selected_route = Some(route);
        self.publish();
        Ok(())
    }

    pub fn start_navigating<L>(&mut self, link: &L) -> Result<(), SessionError>
    where
        L: ChannelLink + ?Sized,
    {
        if !link.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.session.state != SessionState::RouteSelected {
            return Err(self.invalid(SessionState::Navigating));
        }
        let Some(location) = &self.session.last_known_location else {
            return Err(SessionError::MissingLocation);
        };
        let Some(destination) = &self.session.destination else {
            return Err(SessionError::NoDestination);
        };
        let event = StartNavigation {
            start: location.coordinate,
            destination: destination.coordinate,
        };
        if !emit(link, &event) {
            return Err(SessionError::NotConnected);
        }
        self.force_state(SessionState::Navigating);
        self.publish();
        Ok(())
    }

    /// Ends navigation; the stop event is best-effort.
    pub fn stop_navigating<L>(&mut self, link: &L) -> Result<(), SessionError>
    where
        L: ChannelLink + ?Sized,
    {
        if self.session.state != SessionState::Navigating {
            return Err(self.invalid(SessionState::Idle));
        }
        if !emit(link, &StopNavigation {}) {
            warn!("stop_navigation was not delivered");
        }
        self.invalidate_search();
        self.session.destination = None;
        self.force_state(SessionState::Idle);
        self.publish();
        Ok(())
    }

    pub fn on_location_update(&mut self, sample: LocationSample) {
        debug!(location = %sample.coordinate, "location updated");
        self.session.last_known_location = Some(sample);
        self.publish();
    }

    pub async fn refresh_location(
        &mut self,
        source: &dyn LocationSource,
    ) -> Result<LocationSample, SessionError> {
        let coordinate = source
            .current_location()
            .await
            .map_err(SessionError::LocationUnavailable)?;
        let sample = LocationSample::now(coordinate);
        self.on_location_update(sample.clone());
        Ok(sample)
    }

    pub fn set_connectivity_error(&mut self, error: Option<ConnectivityError>) {
        if self.connectivity_error == error {
            return;
        }
        self.connectivity_error = error;
        self.publish();
    }

    /// Back to a fresh idle session, as when the consuming view detaches.
    pub fn reset(&mut self) {
        self.invalidate_search();
        let previous = self.session.state;
        self.session = self.session.restart();
        if previous != SessionState::Idle {
            info!(from = %previous, "session reset");
        }
        self.publish();
    }

    fn invalidate_search(&mut self) {
        self.search_epoch += 1;
        self.candidates.clear();
        self.session.selected_route = None;
    }

    fn invalid(&self, to: SessionState) -> SessionError {
        SessionError::InvalidTransition {
            from: self.session.state,
            to,
        }
    }

    // Callers check preconditions first; the table guards the rest.
    fn force_state(&mut self, next: SessionState) {
        let previous = self.session.state;
        if previous == next {
            return;
        }
        if !previous.can_transition_to(next) {
            warn!(from = %previous, to = %next, "transition outside the session table");
        }
        info!(from = %previous, to = %next, "session state changed");
        self.session.state = next;
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

fn emit<L, E>(link: &L, event: &E) -> bool
where
    L: ChannelLink + ?Sized,
    E: OutboundEvent,
{
    match serde_json::to_value(event) {
        Ok(payload) => link.send(E::NAME, payload),
        Err(err) => {
            warn!(event = E::NAME, error = %err, "failed to encode outbound event");
            false
        }
    }
}

impl std::fmt::Debug for NavigationSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationSessionController")
            .field("session", &self.session)
            .field("candidates", &self.candidates.len())
            .field("connectivity_error", &self.connectivity_error)
            .finish_non_exhaustive()
    }
}
