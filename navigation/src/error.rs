use crate::state::SessionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no destination selected")]
    NoDestination,

    #[error("unknown route id {route_id}")]
    UnknownRoute { route_id: String },

    #[error("not connected to the navigation server")]
    NotConnected,

    #[error("current location is not known yet")]
    MissingLocation,

    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("no routes found for the selected destination")]
    NoRoutes,

    /// The destination changed (or a newer search started) while this search
    /// was in flight; its results were discarded.
    #[error("route search results are stale")]
    StaleSearch,

    #[error("route search failed: {0:#}")]
    RouteSearch(#[source] anyhow::Error),

    #[error("location unavailable: {0:#}")]
    LocationUnavailable(#[source] anyhow::Error),
}
