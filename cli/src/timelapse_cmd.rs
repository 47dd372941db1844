use anyhow::Context;
use anyhow::Result;
use saferoute_protocol::Coordinate;
use saferoute_timelapse::PeriodQuery;
use saferoute_timelapse::RiskAggregator;
use saferoute_timelapse::TimelapseClient;
use saferoute_timelapse::WeightedView;
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::SafeRouteConfig;

/// Fetch a year of incidents around a point and show the weighted view for
/// one month.
#[derive(Debug, clap::Parser)]
pub struct TimelapseArgs {
    /// Latitude of the query center.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the query center.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Year to query. Defaults to the current year.
    #[arg(long)]
    pub year: Option<i32>,

    /// Search radius in kilometres. Defaults to `timelapse.default_radius_km`.
    #[arg(long = "radius-km")]
    pub radius_km: Option<f64>,

    /// Month of the year, 1-12. Defaults to the current month.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    pub month: Option<u8>,

    /// Print the weighted view as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct TimelapseReport<'a> {
    place: &'a str,
    year: i32,
    samples: usize,
    #[serde(flatten)]
    view: &'a WeightedView,
}

impl TimelapseArgs {
    pub async fn run(self, config: &SafeRouteConfig) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let query = PeriodQuery {
            center: Coordinate::new(self.lat, self.lon),
            year: self.year.unwrap_or(now.year()),
            radius_km: self
                .radius_km
                .unwrap_or(config.timelapse.default_radius_km),
        };
        let month_index = self.month.unwrap_or(u8::from(now.month())) - 1;

        let client =
            TimelapseClient::with_timeout(config.api_base_url.as_str(), config.request_timeout())?;
        let period = client
            .fetch(&query)
            .await
            .with_context(|| format!("failed to fetch incidents for {}", query.year))?;
        let place = period.place;
        let year = period.year;

        let mut aggregator = RiskAggregator::new();
        aggregator.ingest(period.data);
        aggregator.set_month(month_index)?;
        let view = aggregator.view();

        if self.json {
            let report = TimelapseReport {
                place: &place,
                year,
                samples: aggregator.samples().len(),
                view: &view,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        let place = if place.is_empty() {
            query.center.to_string()
        } else {
            place
        };
        println!("{place} ({year}), month {}", view.month + 1);
        if aggregator.samples().is_empty() {
            println!("No incidents reported.");
            return Ok(());
        }
        if view.is_fallback {
            println!("No incidents that month; showing the whole year.");
        }
        println!(
            "{} points: {} high, {} medium, {} low",
            view.points.len(),
            view.summary.high,
            view.summary.medium,
            view.summary.low
        );
        for point in &view.points {
            println!("  {}  weight {:.2}", point.coordinate, point.weight);
        }
        Ok(())
    }
}
