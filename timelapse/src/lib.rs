//! Historical incident data: the period query client and the aggregation
//! that turns raw samples into month-filtered visualization weights.

mod aggregator;
mod client;
mod error;
mod query;
mod tracker;

pub use aggregator::MonthSelection;
pub use aggregator::RiskAggregator;
pub use aggregator::WeightSummary;
pub use aggregator::WeightedView;
pub use aggregator::compute_weights;
pub use client::TimelapseClient;
pub use error::AggregateError;
pub use error::DataFetchError;
pub use query::MIN_YEAR;
pub use query::PeriodQuery;
pub use query::PeriodResponse;
pub use tracker::RequestToken;
pub use tracker::RequestTracker;
