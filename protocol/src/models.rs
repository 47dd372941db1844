use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use time::Date;
use time::macros::format_description;

/// Value substituted for a missing or unusable intensity/severity reading.
pub const SIGNAL_FLOOR: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Most recent position fix, from the device or from a server push.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub captured_at: SystemTime,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, captured_at: SystemTime) -> Self {
        Self {
            coordinate,
            captured_at,
        }
    }

    pub fn now(coordinate: Coordinate) -> Self {
        Self::new(coordinate, SystemTime::now())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub coordinate: Coordinate,
    pub label: Option<String>,
}

impl Destination {
    /// Destination picked from the suggestion list.
    pub fn from_suggestion(label: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            label: Some(label.into()),
        }
    }

    /// Destination picked by pressing on the map.
    pub fn from_map_pick(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            label: None,
        }
    }

    /// Text shown for the destination; map picks fall back to the coordinate.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.coordinate.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
}

impl RiskTier {
    pub fn label(self) -> &'static str {
        match self {
            RiskTier::Low => "Low Risk",
            RiskTier::Medium => "Medium Risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("route {id} has an empty path")]
pub struct InvalidRoute {
    pub id: String,
}

/// One route offered by the route-search collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RouteCandidateWire")]
pub struct RouteCandidate {
    id: String,
    name: String,
    #[serde(rename = "eta")]
    eta_label: String,
    #[serde(rename = "risk")]
    risk_tier: RiskTier,
    #[serde(rename = "coordinates")]
    path: Vec<Coordinate>,
}

#[derive(Deserialize)]
struct RouteCandidateWire {
    id: String,
    name: String,
    #[serde(alias = "eta_label")]
    eta: String,
    #[serde(alias = "risk_tier")]
    risk: RiskTier,
    #[serde(alias = "path")]
    coordinates: Vec<Coordinate>,
}

impl TryFrom<RouteCandidateWire> for RouteCandidate {
    type Error = InvalidRoute;

    fn try_from(wire: RouteCandidateWire) -> Result<Self, Self::Error> {
        Self::new(wire.id, wire.name, wire.eta, wire.risk, wire.coordinates)
    }
}

impl RouteCandidate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        eta_label: impl Into<String>,
        risk_tier: RiskTier,
        path: Vec<Coordinate>,
    ) -> Result<Self, InvalidRoute> {
        let id = id.into();
        if path.is_empty() {
            return Err(InvalidRoute { id });
        }
        Ok(Self {
            id,
            name: name.into(),
            eta_label: eta_label.into(),
            risk_tier,
            path,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eta_label(&self) -> &str {
        &self.eta_label
    }

    pub fn risk_tier(&self) -> RiskTier {
        self.risk_tier
    }

    pub fn path(&self) -> &[Coordinate] {
        &self.path
    }

    /// Travel time in minutes parsed from the ETA label ("15 min", "1 h 5 min").
    pub fn eta_minutes(&self) -> Option<u32> {
        parse_eta_minutes(&self.eta_label)
    }
}

fn parse_eta_minutes(label: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut pending: Option<u32> = None;
    let mut matched = false;
    for token in split_number_runs(label) {
        if let Ok(value) = token.parse::<u32>() {
            if pending.is_some() {
                return None;
            }
            pending = Some(value);
            continue;
        }
        let value = pending.take()?;
        let scale = match token.to_ascii_lowercase().as_str() {
            "h" | "hr" | "hrs" | "hour" | "hours" => 60,
            "m" | "min" | "mins" | "minute" | "minutes" => 1,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(scale)?)?;
        matched = true;
    }
    match pending {
        // A bare number is read as minutes.
        Some(value) if !matched => Some(value),
        Some(_) => None,
        None if matched => Some(total),
        None => None,
    }
}

/// Splits "1h 5min" into `["1", "h", "5", "min"]`.
fn split_number_runs(label: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in label.split_whitespace() {
        let mut start = 0;
        let mut last_digit: Option<bool> = None;
        for (idx, ch) in word.char_indices() {
            let is_digit = ch.is_ascii_digit();
            if let Some(previous) = last_digit
                && previous != is_digit
            {
                tokens.push(&word[start..idx]);
                start = idx;
            }
            last_digit = Some(is_digit);
        }
        if start < word.len() {
            tokens.push(&word[start..]);
        }
    }
    tokens
}

/// One historical incident returned by a period query.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "IncidentRecord")]
pub struct IncidentSample {
    pub coordinate: Coordinate,
    pub intensity: f64,
    pub severity: f64,
    /// `None` when the server's date could not be parsed.
    pub occurred_at: Option<Date>,
    pub category: String,
    pub risk_label: String,
    pub description: String,
}

#[derive(Deserialize)]
struct IncidentRecord {
    lat: f64,
    lng: f64,
    #[serde(default)]
    intensity: Option<f64>,
    #[serde(default)]
    severity: Option<f64>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default, rename = "type")]
    category: Option<String>,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<IncidentRecord> for IncidentSample {
    fn from(record: IncidentRecord) -> Self {
        Self {
            coordinate: Coordinate::new(record.lat, record.lng),
            intensity: record.intensity.unwrap_or(SIGNAL_FLOOR),
            severity: record.severity.unwrap_or(SIGNAL_FLOOR),
            occurred_at: record.date.as_deref().and_then(parse_incident_date),
            category: record.category.unwrap_or_default(),
            risk_label: record.risk_level.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
        }
    }
}

/// Accepts `YYYY-MM-DD` and anything that starts with it (RFC 3339 timestamps).
pub fn parse_incident_date(raw: &str) -> Option<Date> {
    let day = raw.trim().get(..10)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

/// Visualization-ready point derived from an [`IncidentSample`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WeightedPoint {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::Month;

    fn route(eta: &str) -> RouteCandidate {
        RouteCandidate::new(
            "r1",
            "Recommended Route",
            eta,
            RiskTier::Low,
            vec![Coordinate::new(40.7128, -74.0060)],
        )
        .expect("non-empty path")
    }

    #[test]
    fn eta_labels_parse_into_minutes() {
        assert_eq!(route("15 min").eta_minutes(), Some(15));
        assert_eq!(route("1 h 5 min").eta_minutes(), Some(65));
        assert_eq!(route("1h5m").eta_minutes(), Some(65));
        assert_eq!(route("20").eta_minutes(), Some(20));
        assert_eq!(route("soon").eta_minutes(), None);
        assert_eq!(route("").eta_minutes(), None);
    }

    #[test]
    fn route_wire_format_matches_server_shape() {
        let value = json!({
            "id": "r2",
            "name": "Alternative Route",
            "eta": "17 min",
            "risk": "medium",
            "coordinates": [
                { "latitude": 40.7128, "longitude": -74.0060 },
                { "latitude": 40.7118, "longitude": -74.0050 }
            ]
        });
        let parsed: RouteCandidate = serde_json::from_value(value).expect("valid route");
        assert_eq!(parsed.id(), "r2");
        assert_eq!(parsed.risk_tier(), RiskTier::Medium);
        assert_eq!(parsed.path().len(), 2);
    }

    #[test]
    fn route_with_empty_path_is_rejected() {
        let value = json!({
            "id": "r9",
            "name": "Nowhere",
            "eta": "1 min",
            "risk": "low",
            "coordinates": []
        });
        let err = serde_json::from_value::<RouteCandidate>(value).expect_err("empty path");
        assert!(err.to_string().contains("empty path"));
    }

    #[test]
    fn incident_record_fills_missing_signal_with_floor() {
        let value = json!({
            "lat": 41.8781,
            "lng": -87.6298,
            "date": "2024-03-15T22:10:00Z",
            "type": "theft",
            "risk_level": "high"
        });
        let sample: IncidentSample = serde_json::from_value(value).expect("valid incident");
        assert_eq!(sample.intensity, SIGNAL_FLOOR);
        assert_eq!(sample.severity, SIGNAL_FLOOR);
        assert_eq!(sample.category, "theft");
        assert_eq!(sample.occurred_at.map(|date| date.month()), Some(Month::March));
    }

    #[test]
    fn unparseable_dates_become_none() {
        assert_eq!(parse_incident_date("yesterday"), None);
        assert_eq!(parse_incident_date("2024-13-01"), None);
        assert!(parse_incident_date("2023-12-31").is_some());
    }

    #[test]
    fn map_pick_label_falls_back_to_coordinate() {
        let destination = Destination::from_map_pick(Coordinate::new(40.7128, -74.006));
        assert_eq!(destination.display_label(), "40.7128, -74.0060");
    }
}
