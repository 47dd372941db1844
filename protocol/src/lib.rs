//! Shared data model and wire payloads for the SafeRoute client core.
//!
//! Everything here is plain data: the channel, navigation and timelapse
//! crates agree on these types and the event names in [`events`].

pub mod events;
pub mod models;

pub use models::Coordinate;
pub use models::Destination;
pub use models::IncidentSample;
pub use models::InvalidRoute;
pub use models::LocationSample;
pub use models::RiskTier;
pub use models::RouteCandidate;
pub use models::SIGNAL_FLOOR;
pub use models::WeightedPoint;
