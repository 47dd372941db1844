//! Navigation session state machine and its wiring to the event channel.

mod binding;
mod controller;
mod error;
mod link;
mod location;
mod ranking;
mod search;
mod state;

pub use binding::SessionBinding;
pub use controller::NavigationSessionController;
pub use controller::PendingSearch;
pub use controller::SessionSnapshot;
pub use error::SessionError;
pub use link::ChannelLink;
pub use location::FixedLocation;
pub use location::LocationSource;
pub use ranking::preferred_route;
pub use search::RouteQuery;
pub use search::RouteSearch;
pub use search::StaticRouteSearch;
pub use state::NavigationSession;
pub use state::SessionState;
