use saferoute_protocol::RouteCandidate;
use std::cmp::Ordering;

/// Index of the route a new search auto-selects: lowest risk tier first,
/// then the shortest ETA. Routes whose ETA cannot be parsed sort after
/// every parsed one, and ties keep the server's order.
pub fn preferred_route(candidates: &[RouteCandidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| compare(a, b))
        .map(|(index, _)| index)
}

fn compare(a: &RouteCandidate, b: &RouteCandidate) -> Ordering {
    a.risk_tier()
        .cmp(&b.risk_tier())
        .then_with(|| match (a.eta_minutes(), b.eta_minutes()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use saferoute_protocol::Coordinate;
    use saferoute_protocol::RiskTier;

    fn route(id: &str, eta: &str, risk: RiskTier) -> RouteCandidate {
        RouteCandidate::new(id, id, eta, risk, vec![Coordinate::new(40.7128, -74.006)])
            .expect("valid route")
    }

    #[test]
    fn low_risk_beats_a_faster_medium_route() {
        let candidates = vec![
            route("fast", "5 min", RiskTier::Medium),
            route("safe", "20 min", RiskTier::Low),
        ];
        assert_eq!(preferred_route(&candidates), Some(1));
    }

    #[test]
    fn shorter_eta_wins_within_a_tier() {
        let candidates = vec![
            route("recommended", "15 min", RiskTier::Low),
            route("alternative", "17 min", RiskTier::Medium),
            route("scenic", "1 h 5 min", RiskTier::Low),
            route("quick", "12 min", RiskTier::Low),
        ];
        assert_eq!(preferred_route(&candidates), Some(3));
    }

    #[test]
    fn unparseable_eta_sorts_last_and_ties_keep_order() {
        let candidates = vec![
            route("unknown", "soon", RiskTier::Low),
            route("first", "15 min", RiskTier::Low),
            route("second", "15 min", RiskTier::Low),
        ];
        assert_eq!(preferred_route(&candidates), Some(1));
        assert_eq!(preferred_route(&[]), None);
    }
}
