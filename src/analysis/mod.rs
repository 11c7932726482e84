//! Aggregate statistics and the rule-based risk explanation.

pub mod explain;
pub mod stats;

pub use explain::{Confidence, Explanation, ExplanationEngine, RiskLevel};
pub use stats::{AnomalyStats, DateRange, ForecastStats, SummaryStats, Trend, TrendBand};
