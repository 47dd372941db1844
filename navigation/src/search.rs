use async_trait::async_trait;
use saferoute_protocol::Coordinate;
use saferoute_protocol::Destination;
use saferoute_protocol::RouteCandidate;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteQuery {
    /// `None` until the first location fix arrives.
    pub origin: Option<Coordinate>,
    pub destination: Destination,
}

/// Supplies route geometry; no routing happens in this crate.
#[async_trait(?Send)]
pub trait RouteSearch {
    async fn search(&self, query: &RouteQuery) -> anyhow::Result<Vec<RouteCandidate>>;
}

/// Returns the same candidates for every query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticRouteSearch {
    routes: Vec<RouteCandidate>,
}

impl StaticRouteSearch {
    pub fn new(routes: Vec<RouteCandidate>) -> Self {
        Self { routes }
    }

    /// Parses a JSON array of routes in the wire format
    /// (`id`, `name`, `eta`, `risk`, `coordinates`).
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(Self::new)
    }

    pub fn routes(&self) -> &[RouteCandidate] {
        &self.routes
    }
}

#[async_trait(?Send)]
impl RouteSearch for StaticRouteSearch {
    async fn search(&self, _query: &RouteQuery) -> anyhow::Result<Vec<RouteCandidate>> {
        Ok(self.routes.clone())
    }
}
