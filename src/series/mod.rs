//! Daily case series: normalization of raw samples and rolling features.

pub mod features;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalysisError;

/// One raw observation as delivered by a loader or API caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub date: NaiveDate,
    /// New cases reported for `date`. Negative values are invalid and
    /// non-finite values mark the day as missing.
    #[serde(alias = "cases", deserialize_with = "deserialize_count")]
    pub count: f64,
}

impl RawSample {
    pub fn new(date: NaiveDate, count: f64) -> Self {
        Self { date, count }
    }
}

// JSON has no NaN, so a missing count arrives as `null`.
fn deserialize_count<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// A continuous, gap-free daily series with non-negative counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSeries {
    start: NaiveDate,
    cases: Vec<f64>,
}

impl CaseSeries {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start
    }

    pub fn end_date(&self) -> NaiveDate {
        self.start + Duration::days(self.cases.len() as i64 - 1)
    }

    pub fn date_at(&self, index: usize) -> NaiveDate {
        self.start + Duration::days(index as i64)
    }

    pub fn values(&self) -> &[f64] {
        &self.cases
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.cases
            .iter()
            .enumerate()
            .map(move |(i, &c)| (self.date_at(i), c))
    }
}

/// Build a continuous daily series from unordered, irregular samples.
///
/// Duplicate dates keep the last sample in input order. Negative counts are
/// clamped to zero. Days with no finite count are linearly interpolated
/// between their nearest known neighbours; edge gaps take the nearest known
/// value. Fails when fewer than `min_points` days result, or when the
/// samples span more than `max_days` calendar days.
pub fn normalize(
    samples: &[RawSample],
    min_points: usize,
    max_days: usize,
) -> Result<CaseSeries, AnalysisError> {
    let mut ordered: Vec<&RawSample> = samples.iter().collect();
    // Stable sort keeps input order among equal dates.
    ordered.sort_by_key(|s| s.date);

    let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(ordered.len());
    for sample in ordered {
        match deduped.last_mut() {
            Some(last) if last.0 == sample.date => last.1 = sample.count,
            _ => deduped.push((sample.date, sample.count)),
        }
    }
    let duplicates = samples.len() - deduped.len();

    let (start, end) = match (deduped.first(), deduped.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => {
            return Err(AnalysisError::InsufficientData {
                required: min_points,
                actual: 0,
            })
        }
    };

    let span = usize::try_from((end - start).num_days())
        .map_or(usize::MAX, |days| days.saturating_add(1));
    if span > max_days {
        return Err(AnalysisError::SeriesTooLong {
            max_days,
            actual: span,
        });
    }
    if span < min_points {
        return Err(AnalysisError::InsufficientData {
            required: min_points,
            actual: span,
        });
    }

    let mut slots: Vec<Option<f64>> = vec![None; span];
    for (date, count) in &deduped {
        if count.is_finite() {
            let idx = (*date - start).num_days() as usize;
            slots[idx] = Some(count.max(0.0));
        }
    }

    let known = slots.iter().filter(|s| s.is_some()).count();
    if known == 0 {
        return Err(AnalysisError::InsufficientData {
            required: min_points,
            actual: 0,
        });
    }

    let cases = fill_gaps(&slots);
    debug!(
        days = span,
        filled = span - known,
        duplicates,
        %start,
        %end,
        "normalized case series"
    );
    Ok(CaseSeries { start, cases })
}

/// Linear interpolation over `None` slots; requires at least one known slot.
fn fill_gaps(slots: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|v| (i, v)))
        .collect();

    let mut out = Vec::with_capacity(slots.len());
    let mut next = 0; // index into `known` of the first known slot at or after i
    for i in 0..slots.len() {
        while next < known.len() && known[next].0 < i {
            next += 1;
        }
        let value = match (next.checked_sub(1).map(|p| known[p]), known.get(next)) {
            (_, Some(&(j, v))) if j == i => v,
            (Some((i0, v0)), Some(&(i1, v1))) => {
                let frac = (i - i0) as f64 / (i1 - i0) as f64;
                v0 + (v1 - v0) * frac
            }
            (Some((_, v0)), None) => v0,
            (None, Some(&(_, v1))) => v1,
            (None, None) => 0.0,
        };
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_DAYS: usize = 3660;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_fills_interior_gap_linearly() {
        let mut samples: Vec<RawSample> = (0..40).map(|d| RawSample::new(day(d), 10.0)).collect();
        // Remove days 10..=12 and set the neighbours apart.
        samples.retain(|s| !(day(10)..=day(12)).contains(&s.date));
        samples.iter_mut().find(|s| s.date == day(13)).unwrap().count = 50.0;

        let series = normalize(&samples, 30, MAX_DAYS).unwrap();
        assert_eq!(series.len(), 40);
        assert_eq!(series.values()[9], 10.0);
        assert_eq!(series.values()[10], 20.0);
        assert_eq!(series.values()[11], 30.0);
        assert_eq!(series.values()[12], 40.0);
        assert_eq!(series.values()[13], 50.0);
    }

    #[test]
    fn test_duplicates_keep_last_and_unsorted_input() {
        let mut samples: Vec<RawSample> = (0..35).rev().map(|d| RawSample::new(day(d), 5.0)).collect();
        samples.push(RawSample::new(day(3), 7.0));
        samples.push(RawSample::new(day(3), 9.0));

        let series = normalize(&samples, 30, MAX_DAYS).unwrap();
        assert_eq!(series.len(), 35);
        assert_eq!(series.start_date(), day(0));
        assert_eq!(series.end_date(), day(34));
        assert_eq!(series.values()[3], 9.0);
    }

    #[test]
    fn test_negative_counts_clamped() {
        let samples: Vec<RawSample> = (0..30)
            .map(|d| RawSample::new(day(d), if d == 5 { -12.0 } else { 3.0 }))
            .collect();
        let series = normalize(&samples, 30, MAX_DAYS).unwrap();
        assert_eq!(series.values()[5], 0.0);
        assert!(series.values().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_missing_edge_values_take_nearest() {
        let mut samples: Vec<RawSample> = (0..30).map(|d| RawSample::new(day(d), 4.0)).collect();
        samples[0].count = f64::NAN;
        samples[29].count = f64::NAN;
        samples[1].count = 6.0;
        let series = normalize(&samples, 30, MAX_DAYS).unwrap();
        assert_eq!(series.values()[0], 6.0);
        assert_eq!(series.values()[29], 4.0);
    }

    #[test]
    fn test_insufficient_data() {
        let samples: Vec<RawSample> = (0..20).map(|d| RawSample::new(day(d), 1.0)).collect();
        let err = normalize(&samples, 30, MAX_DAYS).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InsufficientData {
                required: 30,
                actual: 20
            }
        ));

        let err = normalize(&[], 30, MAX_DAYS).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { actual: 0, .. }));

        let all_missing: Vec<RawSample> = (0..40).map(|d| RawSample::new(day(d), f64::NAN)).collect();
        assert!(normalize(&all_missing, 30, MAX_DAYS).is_err());
    }

    #[test]
    fn test_span_over_limit_rejected_before_filling() {
        let samples = vec![
            RawSample::new(NaiveDate::from_ymd_opt(1000, 1, 1).unwrap(), 1.0),
            RawSample::new(NaiveDate::from_ymd_opt(3000, 1, 1).unwrap(), 2.0),
        ];
        let err = normalize(&samples, 30, MAX_DAYS).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::SeriesTooLong {
                max_days: MAX_DAYS,
                actual
            } if actual > 700_000
        ));

        // A span exactly at the limit is accepted.
        let edge = vec![RawSample::new(day(0), 1.0), RawSample::new(day(39), 1.0)];
        assert_eq!(normalize(&edge, 30, 40).unwrap().len(), 40);
        assert!(normalize(&edge, 30, 39).is_err());
    }

    #[test]
    fn test_sparse_samples_span_counts() {
        // Only two samples, but 31 days apart: interpolation fills the rest.
        let samples = vec![RawSample::new(day(0), 0.0), RawSample::new(day(30), 30.0)];
        let series = normalize(&samples, 30, MAX_DAYS).unwrap();
        assert_eq!(series.len(), 31);
        assert_eq!(series.values()[15], 15.0);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples: Vec<RawSample> = (0..45)
            .filter(|d| d % 4 != 0 || *d == 0 || *d == 44)
            .map(|d| RawSample::new(day(d), (d * 3 % 17) as f64))
            .collect();
        let first = normalize(&samples, 30, MAX_DAYS).unwrap();
        let again: Vec<RawSample> = first.iter().map(|(d, c)| RawSample::new(d, c)).collect();
        let second = normalize(&again, 30, MAX_DAYS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_json_accepts_cases_alias_and_null() {
        let json = r#"[{"date":"2024-01-01","cases":4.0},{"date":"2024-01-02","count":null}]"#;
        let samples: Vec<RawSample> = serde_json::from_str(json).unwrap();
        assert_eq!(samples[0].count, 4.0);
        assert!(samples[1].count.is_nan());
    }
}
