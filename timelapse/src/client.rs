use crate::error::DataFetchError;
use crate::error::GENERIC_FETCH_FAILURE;
use crate::query::PeriodQuery;
use crate::query::PeriodResponse;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use tracing::warn;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TimelapseClient {
    http: reqwest::Client,
    base_url: String,
}

impl TimelapseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataFetchError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DataFetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DataFetchError::Transport)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One `GET /timelapse` round trip. Never retried.
    pub async fn fetch(&self, query: &PeriodQuery) -> Result<PeriodResponse, DataFetchError> {
        query.validate()?;
        let url = format!("{}/timelapse", self.base_url);
        debug!(%url, year = query.year, radius_km = query.radius_km, "fetching timelapse data");
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(DataFetchError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(DataFetchError::Transport)?;

        if status != StatusCode::OK {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| GENERIC_FETCH_FAILURE.to_string());
            warn!(status = status.as_u16(), %message, "timelapse request rejected");
            return Err(DataFetchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let period: PeriodResponse =
            serde_json::from_str(&body).map_err(DataFetchError::Decode)?;
        debug!(
            place = %period.place,
            year = period.year,
            samples = period.data.len(),
            "timelapse data received"
        );
        Ok(period)
    }
}
