use crate::error::DataFetchError;
use saferoute_protocol::Coordinate;
use saferoute_protocol::IncidentSample;
use serde::Deserialize;
use time::OffsetDateTime;

/// Earliest year offered by the period picker.
pub const MIN_YEAR: i32 = 2010;

/// Incidents within `radius_km` of `center` during `year`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodQuery {
    pub center: Coordinate,
    pub year: i32,
    pub radius_km: f64,
}

impl PeriodQuery {
    pub fn validate(&self) -> Result<(), DataFetchError> {
        self.validate_for_year(OffsetDateTime::now_utc().year())
    }

    pub fn validate_for_year(&self, current_year: i32) -> Result<(), DataFetchError> {
        if !self.center.is_finite() {
            return Err(DataFetchError::InvalidQuery(format!(
                "center {} is not a valid coordinate",
                self.center
            )));
        }
        if !(MIN_YEAR..=current_year).contains(&self.year) {
            return Err(DataFetchError::InvalidQuery(format!(
                "year {} is outside {MIN_YEAR}..={current_year}",
                self.year
            )));
        }
        if !self.radius_km.is_finite() || self.radius_km <= 0.0 {
            return Err(DataFetchError::InvalidQuery(format!(
                "radius {} km must be positive",
                self.radius_km
            )));
        }
        Ok(())
    }

    pub(crate) fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("lat", self.center.latitude.to_string()),
            ("lon", self.center.longitude.to_string()),
            ("year", self.year.to_string()),
            ("radius_km", self.radius_km.to_string()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PeriodResponse {
    #[serde(default)]
    pub place: String,
    pub year: i32,
    #[serde(default)]
    pub data: Vec<IncidentSample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query(year: i32, radius_km: f64) -> PeriodQuery {
        PeriodQuery {
            center: Coordinate::new(40.7128, -74.006),
            year,
            radius_km,
        }
    }

    #[test]
    fn accepts_the_picker_range() {
        assert!(query(2010, 10.0).validate_for_year(2026).is_ok());
        assert!(query(2026, 0.5).validate_for_year(2026).is_ok());
    }

    #[test]
    fn rejects_years_outside_the_picker_range() {
        for year in [2009, 2027] {
            let err = query(year, 10.0)
                .validate_for_year(2026)
                .expect_err("out of range");
            assert!(matches!(err, DataFetchError::InvalidQuery(_)), "{err}");
        }
    }

    #[test]
    fn rejects_unusable_radius_and_center() {
        assert!(query(2020, 0.0).validate_for_year(2026).is_err());
        assert!(query(2020, f64::NAN).validate_for_year(2026).is_err());
        let bad_center = PeriodQuery {
            center: Coordinate::new(f64::INFINITY, 0.0),
            ..query(2020, 10.0)
        };
        assert!(bad_center.validate_for_year(2026).is_err());
    }

    #[test]
    fn query_pairs_use_the_server_parameter_names() {
        let names: Vec<&str> = query(2023, 10.0)
            .query_pairs()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(names, vec!["lat", "lon", "year", "radius_km"]);
    }
}
