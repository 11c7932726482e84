//! Trailing-window features used by both anomaly detectors.

use chrono::NaiveDate;
use serde::Serialize;

use super::CaseSeries;

/// Number of columns in an ensemble feature vector.
pub const FEATURE_COUNT: usize = 4;

/// `[cases, rolling_mean, rolling_std, rolling_slope]`
pub type FeatureVector = [f64; FEATURE_COUNT];

/// One day of the feature frame. Rolling fields stay `None` until the
/// trailing window is fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub cases: f64,
    pub rolling_mean: Option<f64>,
    pub rolling_std: Option<f64>,
    pub rolling_slope: Option<f64>,
}

impl FeatureRow {
    /// The full feature vector, or `None` inside the warm-up window.
    pub fn vector(&self) -> Option<FeatureVector> {
        Some([
            self.cases,
            self.rolling_mean?,
            self.rolling_std?,
            self.rolling_slope?,
        ])
    }
}

/// Per-date features aligned 1:1 with the source series.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    /// Compute trailing mean, sample standard deviation and least-squares
    /// slope over `window` days ending at (and including) each date.
    pub fn compute(series: &CaseSeries, window: usize) -> Self {
        let values = series.values();
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, &cases)| {
                let stats = (window >= 2 && i + 1 >= window)
                    .then(|| window_stats(&values[i + 1 - window..=i]));
                FeatureRow {
                    date: series.date_at(i),
                    cases,
                    rolling_mean: stats.map(|s| s.0),
                    rolling_std: stats.map(|s| s.1),
                    rolling_slope: stats.map(|s| s.2),
                }
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows with a complete feature vector, paired with their frame index.
    pub fn defined(&self) -> impl Iterator<Item = (usize, FeatureVector)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.vector().map(|v| (i, v)))
    }

    pub fn defined_count(&self) -> usize {
        self.rows.iter().filter(|r| r.rolling_mean.is_some()).count()
    }
}

/// (mean, sample std, slope) of one window. `w.len() >= 2`.
fn window_stats(w: &[f64]) -> (f64, f64, f64) {
    let n = w.len() as f64;
    let mean = w.iter().sum::<f64>() / n;
    let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    let x_mean = (n - 1.0) / 2.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in w.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - mean);
        den += dx * dx;
    }
    let slope = if den > 0.0 { num / den } else { 0.0 };

    (mean, var.sqrt(), slope)
}
