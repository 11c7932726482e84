//! Deterministic risk assessment and human-readable explanation.
//!
//! The risk level is the first matching rule in [`RISK_RULES`], keyed on the
//! anomaly-rate bucket and the forecast trend. Text is produced from fixed
//! templates so the same statistics always yield the same explanation.

use serde::Serialize;
use tracing::info;

use super::stats::{AnomalyStats, ForecastStats, SummaryStats, Trend};
use crate::config::AnalysisConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyRateBucket {
    Low,
    Moderate,
    High,
}

/// One row of the risk table. `trend: None` matches any trend.
#[derive(Debug, Clone, Copy)]
pub struct RiskRule {
    pub bucket: AnomalyRateBucket,
    pub trend: Option<Trend>,
    pub risk: RiskLevel,
}

impl RiskRule {
    fn matches(&self, bucket: AnomalyRateBucket, trend: Trend) -> bool {
        self.bucket == bucket && self.trend.map_or(true, |t| t == trend)
    }
}

/// Evaluated top to bottom; the first match wins.
pub const RISK_RULES: &[RiskRule] = &[
    RiskRule {
        bucket: AnomalyRateBucket::High,
        trend: None,
        risk: RiskLevel::High,
    },
    RiskRule {
        bucket: AnomalyRateBucket::Moderate,
        trend: Some(Trend::Increasing),
        risk: RiskLevel::High,
    },
    RiskRule {
        bucket: AnomalyRateBucket::Moderate,
        trend: None,
        risk: RiskLevel::Medium,
    },
    RiskRule {
        bucket: AnomalyRateBucket::Low,
        trend: Some(Trend::Increasing),
        risk: RiskLevel::Medium,
    },
    RiskRule {
        bucket: AnomalyRateBucket::Low,
        trend: None,
        risk: RiskLevel::Low,
    },
];

const HIGH_RISK_ACTIONS: &[&str] = &[
    "Activate emergency response protocols",
    "Increase testing and surveillance capacity",
    "Prepare healthcare facilities for surge capacity",
    "Enhance public communication and awareness campaigns",
    "Consider targeted intervention measures",
];

const MEDIUM_RISK_ACTIONS: &[&str] = &[
    "Maintain heightened surveillance",
    "Monitor key indicators daily",
    "Ensure adequate healthcare resources",
    "Prepare contingency plans",
];

const LOW_RISK_ACTIONS: &[&str] = &[
    "Continue routine monitoring",
    "Maintain preventive measures",
    "Update response plans as needed",
];

const INCREASING_TREND_ACTION: &str =
    "Trend analysis suggests potential increase - prepare accordingly";
const DECREASING_TREND_ACTION: &str =
    "Trend analysis suggests cases are declining - verify before relaxing measures";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub summary: String,
    pub risk_level: RiskLevel,
    pub explanation: String,
    pub recommendations: Vec<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone)]
pub struct ExplanationEngine {
    pub moderate_rate: f64,
    pub high_rate: f64,
    pub confidence_high_points: usize,
    pub confidence_medium_points: usize,
}

impl ExplanationEngine {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            moderate_rate: config.risk_moderate_rate,
            high_rate: config.risk_high_rate,
            confidence_high_points: config.confidence_high_points,
            confidence_medium_points: config.confidence_medium_points,
        }
    }

    pub fn bucket(&self, anomaly_rate: f64) -> AnomalyRateBucket {
        if anomaly_rate > self.high_rate {
            AnomalyRateBucket::High
        } else if anomaly_rate >= self.moderate_rate {
            AnomalyRateBucket::Moderate
        } else {
            AnomalyRateBucket::Low
        }
    }

    pub fn risk_level(&self, anomaly_rate: f64, forecast_trend: Trend) -> RiskLevel {
        let bucket = self.bucket(anomaly_rate);
        RISK_RULES
            .iter()
            .find(|rule| rule.matches(bucket, forecast_trend))
            .map_or(RiskLevel::Low, |rule| rule.risk)
    }

    /// Based on history length, lowered one step when the detectors
    /// mostly disagree on the z-score flags.
    pub fn confidence(&self, data_points: usize, anomalies: &AnomalyStats) -> Confidence {
        let base = if data_points >= self.confidence_high_points {
            Confidence::High
        } else if data_points >= self.confidence_medium_points {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        let z = anomalies.z_score_detections;
        if z > 0 && anomalies.both_methods_detections * 2 < z {
            base.downgrade()
        } else {
            base
        }
    }

    pub fn recommendations(risk: RiskLevel, forecast_trend: Trend) -> Vec<String> {
        let catalogue = match risk {
            RiskLevel::High => HIGH_RISK_ACTIONS,
            RiskLevel::Medium => MEDIUM_RISK_ACTIONS,
            RiskLevel::Low => LOW_RISK_ACTIONS,
        };
        let mut out: Vec<String> = catalogue.iter().map(|s| s.to_string()).collect();
        match forecast_trend {
            Trend::Increasing => out.push(INCREASING_TREND_ACTION.to_string()),
            Trend::Decreasing => out.push(DECREASING_TREND_ACTION.to_string()),
            Trend::Stable => {}
        }
        out
    }

    pub fn explain(
        &self,
        region: &str,
        disease: &str,
        summary: &SummaryStats,
        anomalies: &AnomalyStats,
        forecast: &ForecastStats,
    ) -> Explanation {
        let risk = self.risk_level(anomalies.anomaly_rate, forecast.trend);
        let confidence = self.confidence(summary.data_points, anomalies);

        let mut headline = format!(
            "Analysis of {disease} in {region}: Total of {} cases detected. The current trend is {}. ",
            format_thousands(summary.total_cases),
            summary.trend,
        );
        if anomalies.total_anomalies > 0 {
            headline.push_str(&format!(
                "Identified {} anomalous outbreak periods. ",
                anomalies.total_anomalies
            ));
        }
        headline.push_str(&format!(
            "Forecast indicates {} trend over next {} days. Overall risk level: {}.",
            forecast.trend,
            forecast.forecast_horizon_days,
            risk.as_str().to_uppercase(),
        ));

        let explanation = [
            format!(
                "The analysis covers {} days of data from {} to {}.",
                summary.data_points, summary.date_range.start, summary.date_range.end
            ),
            format!(
                "Average daily cases: {:.1}. Peak daily cases: {}.",
                summary.mean_daily_cases,
                format_thousands(summary.max_daily_cases)
            ),
            anomaly_sentence(anomalies),
            format!(
                "The {}-day forecast predicts an average of {:.1} daily cases, indicating a {} trajectory.",
                forecast.forecast_horizon_days, forecast.mean_forecast, forecast.trend
            ),
            risk_sentence(risk).to_string(),
        ]
        .join(" ");

        info!(%risk, ?confidence, region, disease, "generated explanation");

        Explanation {
            summary: headline,
            risk_level: risk,
            explanation,
            recommendations: Self::recommendations(risk, forecast.trend),
            confidence,
        }
    }
}

fn anomaly_sentence(anomalies: &AnomalyStats) -> String {
    if anomalies.total_anomalies == 0 {
        return "No significant anomalies detected in the time series.".to_string();
    }
    format!(
        "Anomaly detection identified unusual patterns in {:.1}% of the data \
         ({} by Z-score, {} by Isolation Forest, {} by both).",
        anomalies.anomaly_rate * 100.0,
        anomalies.z_score_detections,
        anomalies.isolation_forest_detections,
        anomalies.both_methods_detections,
    )
}

fn risk_sentence(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::High => {
            "HIGH RISK: Multiple outbreak signals detected. \
             Enhanced monitoring and intervention measures recommended."
        }
        RiskLevel::Medium => {
            "MEDIUM RISK: Some concerning patterns identified. Continued surveillance advised."
        }
        RiskLevel::Low => "LOW RISK: Situation appears stable with no major outbreak indicators.",
    }
}

/// Round to a whole number and group thousands with commas.
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stats::DateRange;
    use chrono::NaiveDate;

    fn engine() -> ExplanationEngine {
        ExplanationEngine::from_config(&AnalysisConfig::default())
    }

    fn anomaly_stats(total: usize, rate: f64, z: usize, both: usize) -> AnomalyStats {
        AnomalyStats {
            total_anomalies: total,
            anomaly_rate: rate,
            z_score_detections: z,
            isolation_forest_detections: total.saturating_sub(z) + both,
            both_methods_detections: both,
            average_anomaly_magnitude: 0.0,
        }
    }

    #[test]
    fn test_rule_table() {
        let e = engine();
        use Trend::*;
        let cases = [
            (0.30, Stable, RiskLevel::High),
            (0.30, Decreasing, RiskLevel::High),
            (0.20, Increasing, RiskLevel::High),
            (0.20, Stable, RiskLevel::Medium),
            (0.20, Decreasing, RiskLevel::Medium),
            (0.15, Stable, RiskLevel::Medium),
            (0.25, Stable, RiskLevel::Medium),
            (0.05, Increasing, RiskLevel::Medium),
            (0.05, Stable, RiskLevel::Low),
            (0.0, Decreasing, RiskLevel::Low),
        ];
        for (rate, trend, want) in cases {
            assert_eq!(e.risk_level(rate, trend), want, "rate={rate} trend={trend}");
        }
        assert_eq!(e.risk_level(3.0 / 90.0, Increasing), RiskLevel::Medium);
    }

    #[test]
    fn test_confidence_by_history_length() {
        let e = engine();
        let quiet = anomaly_stats(0, 0.0, 0, 0);
        assert_eq!(e.confidence(120, &quiet), Confidence::High);
        assert_eq!(e.confidence(90, &quiet), Confidence::High);
        assert_eq!(e.confidence(45, &quiet), Confidence::Medium);
        assert_eq!(e.confidence(29, &quiet), Confidence::Low);
    }

    #[test]
    fn test_confidence_downgraded_on_disagreement() {
        let e = engine();
        assert_eq!(e.confidence(120, &anomaly_stats(6, 0.05, 4, 1)), Confidence::Medium);
        assert_eq!(e.confidence(120, &anomaly_stats(6, 0.05, 4, 2)), Confidence::High);
        assert_eq!(e.confidence(40, &anomaly_stats(3, 0.05, 3, 0)), Confidence::Low);
        assert_eq!(e.confidence(10, &anomaly_stats(3, 0.05, 3, 0)), Confidence::Low);
    }

    #[test]
    fn test_recommendations() {
        let low = ExplanationEngine::recommendations(RiskLevel::Low, Trend::Stable);
        assert_eq!(low.len(), 3);
        assert_eq!(low[0], "Continue routine monitoring");

        let high = ExplanationEngine::recommendations(RiskLevel::High, Trend::Increasing);
        assert_eq!(high.len(), 6);
        assert_eq!(high.last().unwrap(), INCREASING_TREND_ACTION);

        let medium = ExplanationEngine::recommendations(RiskLevel::Medium, Trend::Decreasing);
        assert_eq!(medium.last().unwrap(), DECREASING_TREND_ACTION);
    }

    #[test]
    fn test_explanation_text() {
        let summary = SummaryStats {
            total_cases: 1_234_567.0,
            mean_daily_cases: 13_717.4,
            max_daily_cases: 25_010.0,
            min_daily_cases: 3.0,
            std_daily_cases: 10.0,
            data_points: 90,
            date_range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 30).unwrap(),
            },
            trend: Trend::Increasing,
        };
        let anomalies = anomaly_stats(3, 3.0 / 84.0, 2, 1);
        let forecast = ForecastStats {
            forecast_horizon_days: 14,
            mean_forecast: 15_000.0,
            max_forecast: 16_000.0,
            min_forecast: 14_000.0,
            trend: Trend::Increasing,
        };

        let out = engine().explain("Kenya", "Malaria", &summary, &anomalies, &forecast);
        assert_eq!(out.risk_level, RiskLevel::Medium);
        assert_eq!(out.confidence, Confidence::High);
        assert!(out.summary.starts_with("Analysis of Malaria in Kenya: Total of 1,234,567 cases"));
        assert!(out.summary.contains("Identified 3 anomalous outbreak periods."));
        assert!(out.summary.ends_with("Overall risk level: MEDIUM."));
        assert!(out.explanation.contains("covers 90 days of data from 2024-01-01 to 2024-03-30"));
        assert!(out.explanation.contains("Peak daily cases: 25,010."));
        assert!(out.explanation.contains("average of 15000.0 daily cases"));
        assert!(out.explanation.ends_with("Continued surveillance advised."));
        assert_eq!(out.recommendations.last().unwrap(), INCREASING_TREND_ACTION);
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0), "0");
        assert_eq!(format_thousands(999.4), "999");
        assert_eq!(format_thousands(1000.0), "1,000");
        assert_eq!(format_thousands(1_234_567.0), "1,234,567");
        assert_eq!(format_thousands(-12_345.0), "-12,345");
    }
}
