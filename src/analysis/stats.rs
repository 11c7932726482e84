use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::AnalysisConfig;
use crate::detect::combine::CombinedAnomalies;
use crate::forecast::ForecastPoint;
use crate::series::CaseSeries;

/// Keeps the relative change finite when the leading window is all zeros.
const TREND_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compares the mean of the leading and trailing `window` values.
#[derive(Debug, Clone, Copy)]
pub struct TrendBand {
    pub window: usize,
    /// Relative change beyond which the series is not "stable".
    pub threshold: f64,
}

impl TrendBand {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            window: config.trend_window,
            threshold: config.trend_change_threshold,
        }
    }

    /// Short inputs shrink the window to half the series.
    pub fn classify(&self, values: &[f64]) -> Trend {
        if values.len() < 2 {
            return Trend::Stable;
        }
        let w = self.window.min(values.len() / 2).max(1);
        let first = values[..w].iter().sum::<f64>() / w as f64;
        let last = values[values.len() - w..].iter().sum::<f64>() / w as f64;
        let change = (last - first) / (first.abs() + TREND_EPSILON);

        if change > self.threshold {
            Trend::Increasing
        } else if change < -self.threshold {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_cases: f64,
    pub mean_daily_cases: f64,
    pub max_daily_cases: f64,
    pub min_daily_cases: f64,
    /// Sample standard deviation; 0 for a single day.
    pub std_daily_cases: f64,
    pub data_points: usize,
    pub date_range: DateRange,
    pub trend: Trend,
}

impl SummaryStats {
    pub fn compute(series: &CaseSeries, band: &TrendBand) -> Self {
        let values = series.values();
        let std = if values.len() > 1 {
            values.iter().std_dev()
        } else {
            0.0
        };
        Self {
            total_cases: values.iter().sum(),
            mean_daily_cases: if values.is_empty() { 0.0 } else { values.iter().mean() },
            max_daily_cases: values.iter().copied().fold(0.0, f64::max),
            min_daily_cases: values.iter().copied().reduce(f64::min).unwrap_or(0.0),
            std_daily_cases: std,
            data_points: values.len(),
            date_range: DateRange {
                start: series.start_date(),
                end: series.end_date(),
            },
            trend: band.classify(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyStats {
    pub total_anomalies: usize,
    /// Anomalies over rows that had a complete feature vector.
    pub anomaly_rate: f64,
    pub z_score_detections: usize,
    pub isolation_forest_detections: usize,
    pub both_methods_detections: usize,
    /// Mean case count over the flagged dates.
    pub average_anomaly_magnitude: f64,
}

impl AnomalyStats {
    pub fn compute(combined: &CombinedAnomalies) -> Self {
        let total = combined.records.len();
        let anomaly_rate = if combined.evaluated_points == 0 {
            0.0
        } else {
            total as f64 / combined.evaluated_points as f64
        };
        let average_anomaly_magnitude = if total == 0 {
            0.0
        } else {
            combined.records.iter().map(|r| r.cases).sum::<f64>() / total as f64
        };
        Self {
            total_anomalies: total,
            anomaly_rate,
            z_score_detections: combined.z_score_count,
            isolation_forest_detections: combined.ensemble_count,
            both_methods_detections: combined.agreement_count,
            average_anomaly_magnitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStats {
    pub forecast_horizon_days: usize,
    pub mean_forecast: f64,
    pub max_forecast: f64,
    pub min_forecast: f64,
    pub trend: Trend,
}

impl ForecastStats {
    pub fn compute(points: &[ForecastPoint], band: &TrendBand) -> Self {
        let values: Vec<f64> = points.iter().map(|p| p.forecast).collect();
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        Self {
            forecast_horizon_days: values.len(),
            mean_forecast: mean,
            max_forecast: values.iter().copied().fold(0.0, f64::max),
            min_forecast: values.iter().copied().reduce(f64::min).unwrap_or(0.0),
            trend: band.classify(&values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{AnomalyRecord, DetectionMethod};
    use crate::series::{normalize, RawSample};
    use chrono::Duration;

    fn band() -> TrendBand {
        TrendBand::from_config(&AnalysisConfig::default())
    }

    fn series(values: &[f64]) -> CaseSeries {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let samples: Vec<RawSample> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| RawSample::new(start + Duration::days(i as i64), v))
            .collect();
        normalize(&samples, 1, usize::MAX).unwrap()
    }

    #[test]
    fn test_trend_band() {
        let b = band();
        let rising: Vec<f64> = (0..90).map(|d| 1000.0 + 2.0 * d as f64 + (d % 5) as f64).collect();
        assert_eq!(b.classify(&rising), Trend::Increasing);

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(b.classify(&falling), Trend::Decreasing);

        assert_eq!(b.classify(&[40.0; 40]), Trend::Stable);
        // +9% stays inside the band.
        let mild: Vec<f64> = (0..14).map(|i| if i < 7 { 100.0 } else { 109.0 }).collect();
        assert_eq!(b.classify(&mild), Trend::Stable);
    }

    #[test]
    fn test_trend_band_short_and_zero_inputs() {
        let b = band();
        assert_eq!(b.classify(&[]), Trend::Stable);
        assert_eq!(b.classify(&[5.0]), Trend::Stable);
        // Window shrinks to 2 for four values.
        assert_eq!(b.classify(&[1.0, 1.0, 3.0, 3.0]), Trend::Increasing);
        assert_eq!(b.classify(&[0.0, 0.0, 0.0, 0.0]), Trend::Stable);
        assert_eq!(b.classify(&[0.0, 0.0, 1.0, 1.0]), Trend::Increasing);
    }

    #[test]
    fn test_summary_stats() {
        let s = series(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let stats = SummaryStats::compute(&s, &band());
        assert_eq!(stats.total_cases, 40.0);
        assert_eq!(stats.mean_daily_cases, 5.0);
        assert_eq!(stats.max_daily_cases, 9.0);
        assert_eq!(stats.min_daily_cases, 2.0);
        assert!((stats.std_daily_cases - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.data_points, 8);
        assert_eq!(stats.date_range.start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(stats.date_range.end, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());
    }

    #[test]
    fn test_anomaly_stats_magnitude_is_mean_cases() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let record = |cases: f64, by: Vec<DetectionMethod>| AnomalyRecord {
            date: day,
            cases,
            rolling_mean: 10.0,
            z_score: 0.0,
            anomaly_score: -0.5,
            detected_by: by,
        };
        let combined = CombinedAnomalies {
            records: vec![
                record(30.0, vec![DetectionMethod::ZScore, DetectionMethod::IsolationForest]),
                record(50.0, vec![DetectionMethod::IsolationForest]),
            ],
            z_score_count: 1,
            ensemble_count: 2,
            agreement_count: 1,
            evaluated_points: 40,
        };
        let stats = AnomalyStats::compute(&combined);
        assert_eq!(stats.total_anomalies, 2);
        assert_eq!(stats.anomaly_rate, 0.05);
        assert_eq!(stats.both_methods_detections, 1);
        assert_eq!(stats.average_anomaly_magnitude, 40.0);

        let empty = CombinedAnomalies {
            records: vec![],
            z_score_count: 0,
            ensemble_count: 0,
            agreement_count: 0,
            evaluated_points: 0,
        };
        let stats = AnomalyStats::compute(&empty);
        assert_eq!(stats.anomaly_rate, 0.0);
        assert_eq!(stats.average_anomaly_magnitude, 0.0);
    }

    #[test]
    fn test_forecast_stats() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let points: Vec<ForecastPoint> = (0..14)
            .map(|h| {
                let v = 100.0 + 5.0 * h as f64;
                ForecastPoint::clamped(start + Duration::days(h), v, v - 10.0, v + 10.0)
            })
            .collect();
        let stats = ForecastStats::compute(&points, &band());
        assert_eq!(stats.forecast_horizon_days, 14);
        assert_eq!(stats.min_forecast, 100.0);
        assert_eq!(stats.max_forecast, 165.0);
        assert!((stats.mean_forecast - 132.5).abs() < 1e-12);
        assert_eq!(stats.trend, Trend::Increasing);
    }

    #[test]
    fn test_trend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Stable).unwrap(), r#""stable""#);
    }
}
