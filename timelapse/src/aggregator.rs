use crate::error::AggregateError;
use saferoute_protocol::IncidentSample;
use saferoute_protocol::SIGNAL_FLOOR;
use saferoute_protocol::WeightedPoint;
use serde::Serialize;
use time::Month;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

const INTENSITY_SHARE: f64 = 0.4;
const SEVERITY_SHARE: f64 = 0.6;
const MIN_WEIGHT: f64 = 0.2;
const MAX_WEIGHT: f64 = 1.0;
/// Used for every point when the set cannot be normalized.
const DEGENERATE_WEIGHT: f64 = 0.5;
const HIGH_WEIGHT: f64 = 0.8;

/// Samples for one month of the year, or the full set when that month is
/// empty.
#[derive(Clone, Debug, PartialEq)]
pub struct MonthSelection {
    pub month: u8,
    pub samples: Vec<IncidentSample>,
    pub is_fallback: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WeightSummary {
    /// Weight ≥ 0.8.
    pub high: usize,
    /// 0.5 ≤ weight < 0.8.
    pub medium: usize,
    /// Weight < 0.5.
    pub low: usize,
}

impl WeightSummary {
    pub fn of(points: &[WeightedPoint]) -> Self {
        points.iter().fold(Self::default(), |mut summary, point| {
            if point.weight >= HIGH_WEIGHT {
                summary.high += 1;
            } else if point.weight >= DEGENERATE_WEIGHT {
                summary.medium += 1;
            } else {
                summary.low += 1;
            }
            summary
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WeightedView {
    pub month: u8,
    pub points: Vec<WeightedPoint>,
    pub is_fallback: bool,
    pub summary: WeightSummary,
}

/// Holds the latest period's samples and publishes the weighted view for
/// the selected month. Last `ingest` wins.
#[derive(Debug)]
pub struct RiskAggregator {
    samples: Vec<IncidentSample>,
    month: u8,
    view_tx: watch::Sender<WeightedView>,
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAggregator {
    /// Starts on January with no samples.
    pub fn new() -> Self {
        let (view_tx, _) = watch::channel(WeightedView::default());
        Self {
            samples: Vec::new(),
            month: 0,
            view_tx,
        }
    }

    pub fn samples(&self) -> &[IncidentSample] {
        &self.samples
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn subscribe(&self) -> watch::Receiver<WeightedView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> WeightedView {
        self.view_tx.borrow().clone()
    }

    /// Replaces the held samples. Unusable intensity or severity readings
    /// are replaced with [`SIGNAL_FLOOR`].
    pub fn ingest(&mut self, samples: Vec<IncidentSample>) {
        self.samples = samples.into_iter().map(sanitize).collect();
        info!(count = self.samples.len(), "incident samples ingested");
        self.publish();
    }

    pub fn set_month(&mut self, month_index: u8) -> Result<(), AggregateError> {
        validate_month(month_index)?;
        self.month = month_index;
        self.publish();
        Ok(())
    }

    pub fn filter_by_month(&self, month_index: u8) -> Result<MonthSelection, AggregateError> {
        let month = month_of(month_index)?;
        let matching: Vec<IncidentSample> = self
            .samples
            .iter()
            .filter(|sample| sample.occurred_at.is_some_and(|date| date.month() == month))
            .cloned()
            .collect();
        debug!(
            month = month_index + 1,
            matching = matching.len(),
            total = self.samples.len(),
            "filtered samples by month"
        );
        if matching.is_empty() && !self.samples.is_empty() {
            return Ok(MonthSelection {
                month: month_index,
                samples: self.samples.clone(),
                is_fallback: true,
            });
        }
        Ok(MonthSelection {
            month: month_index,
            samples: matching,
            is_fallback: false,
        })
    }

    pub fn filter_and_weight(&self, month_index: u8) -> Result<WeightedView, AggregateError> {
        let selection = self.filter_by_month(month_index)?;
        let points = compute_weights(&selection.samples);
        let summary = WeightSummary::of(&points);
        Ok(WeightedView {
            month: selection.month,
            points,
            is_fallback: selection.is_fallback,
            summary,
        })
    }

    fn publish(&self) {
        // `self.month` was validated when it was set.
        let Ok(view) = self.filter_and_weight(self.month) else {
            return;
        };
        debug!(
            month = view.month + 1,
            high = view.summary.high,
            medium = view.summary.medium,
            low = view.summary.low,
            fallback = view.is_fallback,
            "weighted view published"
        );
        self.view_tx.send_replace(view);
    }
}

/// `clamp(0.4 * i / max_i + 0.6 * s / max_s, 0.2, 1.0)` per sample. An axis
/// with no positive reading is normalized by 1. When neither axis has a
/// positive reading, or a maximum is not finite, every point gets 0.5.
pub fn compute_weights(samples: &[IncidentSample]) -> Vec<WeightedPoint> {
    let max_intensity = samples
        .iter()
        .map(|sample| sample.intensity)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_severity = samples
        .iter()
        .map(|sample| sample.severity)
        .fold(f64::NEG_INFINITY, f64::max);
    let normalizers = normalizers(max_intensity, max_severity);

    samples
        .iter()
        .map(|sample| {
            let weight = match normalizers {
                Some((max_intensity, max_severity)) => {
                    let raw = INTENSITY_SHARE * (sample.intensity / max_intensity)
                        + SEVERITY_SHARE * (sample.severity / max_severity);
                    if raw.is_finite() {
                        raw.clamp(MIN_WEIGHT, MAX_WEIGHT)
                    } else {
                        DEGENERATE_WEIGHT
                    }
                }
                None => DEGENERATE_WEIGHT,
            };
            WeightedPoint {
                coordinate: sample.coordinate,
                weight,
            }
        })
        .collect()
}

fn normalizers(max_intensity: f64, max_severity: f64) -> Option<(f64, f64)> {
    if !max_intensity.is_finite() || !max_severity.is_finite() {
        return None;
    }
    if max_intensity <= 0.0 && max_severity <= 0.0 {
        return None;
    }
    let floor = |max: f64| if max > 0.0 { max } else { 1.0 };
    Some((floor(max_intensity), floor(max_severity)))
}

fn sanitize(mut sample: IncidentSample) -> IncidentSample {
    if !usable_reading(sample.intensity) {
        sample.intensity = SIGNAL_FLOOR;
    }
    if !usable_reading(sample.severity) {
        sample.severity = SIGNAL_FLOOR;
    }
    sample
}

fn usable_reading(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn validate_month(month_index: u8) -> Result<(), AggregateError> {
    month_of(month_index).map(|_| ())
}

fn month_of(month_index: u8) -> Result<Month, AggregateError> {
    Month::try_from(month_index.saturating_add(1))
        .map_err(|_| AggregateError::InvalidMonth(month_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use saferoute_protocol::Coordinate;
    use time::Date;

    fn sample(intensity: f64, severity: f64, date: Option<(i32, Month, u8)>) -> IncidentSample {
        IncidentSample {
            coordinate: Coordinate::new(40.7128, -74.006),
            intensity,
            severity,
            occurred_at: date.map(|(year, month, day)| {
                Date::from_calendar_date(year, month, day).expect("valid date")
            }),
            category: "theft".to_string(),
            risk_label: "medium".to_string(),
            description: String::new(),
        }
    }

    fn weights(points: &[WeightedPoint]) -> Vec<f64> {
        points.iter().map(|point| point.weight).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn weights_blend_intensity_and_severity() {
        let points = compute_weights(&[sample(10.0, 2.0, None), sample(2.0, 10.0, None)]);
        assert_close(&weights(&points), &[0.52, 0.68]);
    }

    #[test]
    fn weights_are_clamped_to_the_visible_range() {
        let samples = [
            sample(100.0, 100.0, None),
            sample(0.0, 0.0, None),
            sample(1.0, 3.0, None),
            sample(55.0, 0.5, None),
        ];
        let points = compute_weights(&samples);
        assert_close(&weights(&points)[..2], &[1.0, 0.2]);
        assert!(
            points
                .iter()
                .all(|point| (MIN_WEIGHT..=MAX_WEIGHT).contains(&point.weight))
        );
    }

    #[test]
    fn all_zero_readings_fall_back_to_half_weight() {
        let points = compute_weights(&[sample(0.0, 0.0, None), sample(0.0, 0.0, None)]);
        assert_eq!(weights(&points), vec![0.5, 0.5]);

        assert!(compute_weights(&[]).is_empty());
    }

    #[test]
    fn an_axis_without_positive_readings_is_normalized_by_one() {
        let severity_only = compute_weights(&[sample(0.0, 10.0, None), sample(0.0, 2.0, None)]);
        assert_close(&weights(&severity_only), &[0.6, 0.2]);

        let intensity_only = compute_weights(&[sample(5.0, 0.0, None), sample(10.0, 0.0, None)]);
        assert_close(&weights(&intensity_only), &[0.2, 0.4]);
    }

    #[test]
    fn ingest_replaces_unusable_readings() {
        let mut aggregator = RiskAggregator::new();
        aggregator.ingest(vec![
            sample(f64::NAN, -3.0, None),
            sample(f64::INFINITY, 0.0, None),
        ]);

        let readings: Vec<(f64, f64)> = aggregator
            .samples()
            .iter()
            .map(|sample| (sample.intensity, sample.severity))
            .collect();
        assert_eq!(readings, vec![(1.0, 1.0), (1.0, 0.0)]);
    }

    #[test]
    fn month_filter_matches_any_year() {
        let mut aggregator = RiskAggregator::new();
        aggregator.ingest(vec![
            sample(1.0, 1.0, Some((2022, Month::March, 4))),
            sample(2.0, 2.0, Some((2023, Month::March, 28))),
            sample(3.0, 3.0, Some((2023, Month::April, 1))),
            sample(4.0, 4.0, None),
        ]);

        let march = aggregator.filter_by_month(2).expect("valid month");

        assert!(!march.is_fallback);
        assert_eq!(
            march
                .samples
                .iter()
                .map(|sample| sample.intensity)
                .collect::<Vec<_>>(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn empty_month_returns_the_full_set_flagged() {
        let mut aggregator = RiskAggregator::new();
        aggregator.ingest(vec![
            sample(1.0, 1.0, Some((2023, Month::April, 1))),
            sample(2.0, 2.0, None),
        ]);

        let december = aggregator.filter_by_month(11).expect("valid month");

        assert!(december.is_fallback);
        assert_eq!(december.samples.len(), 2);
    }

    #[test]
    fn out_of_range_months_are_rejected() {
        let aggregator = RiskAggregator::new();
        assert_eq!(
            aggregator.filter_by_month(12),
            Err(AggregateError::InvalidMonth(12))
        );
        assert_eq!(
            aggregator.filter_by_month(255),
            Err(AggregateError::InvalidMonth(255))
        );
        assert!(aggregator.filter_by_month(0).is_ok());
    }

    #[test]
    fn set_month_publishes_a_new_view() {
        let mut aggregator = RiskAggregator::new();
        let mut views = aggregator.subscribe();
        aggregator.ingest(vec![
            sample(10.0, 10.0, Some((2023, Month::June, 2))),
            sample(1.0, 1.0, Some((2023, Month::July, 9))),
        ]);
        assert!(views.borrow_and_update().is_fallback);

        aggregator.set_month(5).expect("june");

        let view = views.borrow_and_update().clone();
        assert_eq!(view.month, 5);
        assert!(!view.is_fallback);
        assert_eq!(view.points.len(), 1);
        assert_eq!(
            view.summary,
            WeightSummary {
                high: 1,
                medium: 0,
                low: 0
            }
        );
        assert_eq!(aggregator.set_month(12), Err(AggregateError::InvalidMonth(12)));
        assert_eq!(aggregator.month(), 5);
    }

    #[test]
    fn summary_buckets_match_the_thresholds() {
        let point = |weight| WeightedPoint {
            coordinate: Coordinate::new(0.0, 0.0),
            weight,
        };
        let summary = WeightSummary::of(&[point(0.8), point(0.79), point(0.5), point(0.2)]);
        assert_eq!(
            summary,
            WeightSummary {
                high: 1,
                medium: 2,
                low: 1
            }
        );
    }
}
