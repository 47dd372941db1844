use async_trait::async_trait;
use saferoute_protocol::Coordinate;

/// Device position provider. Sensing itself lives outside this crate.
#[async_trait(?Send)]
pub trait LocationSource {
    async fn current_location(&self) -> anyhow::Result<Coordinate>;
}

/// A source that always reports the same position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedLocation(pub Coordinate);

#[async_trait(?Send)]
impl LocationSource for FixedLocation {
    async fn current_location(&self) -> anyhow::Result<Coordinate> {
        Ok(self.0)
    }
}
