//! TOML configuration for the outbreak detector.
//!
//! Layered lookup: the file named by `OUTBREAK_CONFIG`, then
//! `./outbreak-detector.toml`, then compiled-in defaults. Every analysis
//! constant lives in [`AnalysisConfig`], which is handed to the pipeline at
//! construction so concurrent runs can use different settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AnalysisError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "OUTBREAK_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "outbreak-detector.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the service and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .analysis
            .validate()
            .with_context(|| format!("invalid analysis settings in {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: `OUTBREAK_CONFIG`, `./outbreak-detector.toml`, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(
                        path = %path.display(),
                        %error,
                        "OUTBREAK_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(
                        path = %local.display(),
                        %error,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Server / data / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding case CSV files.
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/raw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// How the forecaster combines seasonality with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

/// Tunable constants for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub z_score_threshold: f64,
    pub isolation_forest_contamination: f64,
    pub ensemble_tree_count: usize,
    /// Subsample size per isolation tree (capped at the row count).
    pub ensemble_max_samples: usize,
    pub random_seed: u64,
    pub rolling_window: usize,
    pub min_data_points: usize,
    /// Longest calendar span (days) a series may cover after normalization.
    pub max_series_days: usize,
    pub forecast_horizon: usize,
    pub forecast_interval_width: f64,
    pub seasonality_mode: SeasonalityMode,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    /// History span (days) required before yearly seasonality is modeled.
    pub yearly_seasonality_min_days: i64,
    pub trend_window: usize,
    /// Relative change separating "stable" from "increasing"/"decreasing".
    pub trend_change_threshold: f64,
    pub risk_moderate_rate: f64,
    pub risk_high_rate: f64,
    pub confidence_high_points: usize,
    pub confidence_medium_points: usize,
    /// Upper bound on ensemble/forecast fits running at once.
    pub max_concurrent_fits: usize,
    /// Per-run deadline; `None` disables it.
    pub timeout_secs: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: 2.5,
            isolation_forest_contamination: 0.1,
            ensemble_tree_count: 100,
            ensemble_max_samples: 256,
            random_seed: 42,
            rolling_window: 7,
            min_data_points: 30,
            max_series_days: 3660,
            forecast_horizon: 14,
            forecast_interval_width: 0.95,
            seasonality_mode: SeasonalityMode::Multiplicative,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_seasonality_min_days: 365,
            trend_window: 7,
            trend_change_threshold: 0.10,
            risk_moderate_rate: 0.15,
            risk_high_rate: 0.25,
            confidence_high_points: 90,
            confidence_medium_points: 30,
            max_concurrent_fits: 4,
            timeout_secs: Some(30),
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let fail = |msg: String| Err(AnalysisError::InvalidConfig(msg));

        if !(self.z_score_threshold.is_finite() && self.z_score_threshold > 0.0) {
            return fail(format!(
                "z_score_threshold must be positive, got {}",
                self.z_score_threshold
            ));
        }
        if !(self.isolation_forest_contamination > 0.0
            && self.isolation_forest_contamination <= 0.5)
        {
            return fail(format!(
                "isolation_forest_contamination must be in (0, 0.5], got {}",
                self.isolation_forest_contamination
            ));
        }
        if self.ensemble_tree_count == 0 {
            return fail("ensemble_tree_count must be at least 1".into());
        }
        if self.ensemble_max_samples < 2 {
            return fail("ensemble_max_samples must be at least 2".into());
        }
        if self.rolling_window < 2 {
            return fail(format!(
                "rolling_window must be at least 2, got {}",
                self.rolling_window
            ));
        }
        if self.min_data_points <= self.rolling_window {
            return fail(format!(
                "min_data_points ({}) must exceed rolling_window ({})",
                self.min_data_points, self.rolling_window
            ));
        }
        if self.max_series_days < self.min_data_points {
            return fail(format!(
                "max_series_days ({}) must be at least min_data_points ({})",
                self.max_series_days, self.min_data_points
            ));
        }
        if self.forecast_horizon == 0 {
            return fail("forecast_horizon must be at least 1".into());
        }
        if !(self.forecast_interval_width > 0.0 && self.forecast_interval_width < 1.0) {
            return fail(format!(
                "forecast_interval_width must be in (0, 1), got {}",
                self.forecast_interval_width
            ));
        }
        if !(self.changepoint_prior_scale > 0.0 && self.seasonality_prior_scale > 0.0) {
            return fail("prior scales must be positive".into());
        }
        if self.trend_window == 0 {
            return fail("trend_window must be at least 1".into());
        }
        if !(self.trend_change_threshold >= 0.0) {
            return fail("trend_change_threshold must be non-negative".into());
        }
        if !(0.0 <= self.risk_moderate_rate && self.risk_moderate_rate <= self.risk_high_rate) {
            return fail(format!(
                "risk thresholds must satisfy 0 <= moderate ({}) <= high ({})",
                self.risk_moderate_rate, self.risk_high_rate
            ));
        }
        if self.confidence_medium_points > self.confidence_high_points {
            return fail("confidence_medium_points must not exceed confidence_high_points".into());
        }
        if self.max_concurrent_fits == 0 {
            return fail("max_concurrent_fits must be at least 1".into());
        }
        if self.timeout_secs == Some(0) {
            return fail("timeout_secs must be positive when set".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.z_score_threshold, 2.5);
        assert_eq!(cfg.isolation_forest_contamination, 0.1);
        assert_eq!(cfg.ensemble_tree_count, 100);
        assert_eq!(cfg.rolling_window, 7);
        assert_eq!(cfg.min_data_points, 30);
        assert_eq!(cfg.forecast_horizon, 14);
        assert_eq!(cfg.forecast_interval_width, 0.95);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [server]
            bind = "127.0.0.1:9000"

            [analysis]
            z_score_threshold = 3.0
            seasonality_mode = "additive"
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.analysis.z_score_threshold, 3.0);
        assert_eq!(cfg.analysis.seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(cfg.analysis.rolling_window, 7);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_window = AnalysisConfig {
            rolling_window: 1,
            ..AnalysisConfig::default()
        };
        assert!(bad_window.validate().is_err());

        let bad_contamination = AnalysisConfig {
            isolation_forest_contamination: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(bad_contamination.validate().is_err());

        let bad_width = AnalysisConfig {
            forecast_interval_width: 1.0,
            ..AnalysisConfig::default()
        };
        assert!(bad_width.validate().is_err());

        let bad_span = AnalysisConfig {
            max_series_days: 20,
            ..AnalysisConfig::default()
        };
        assert!(bad_span.validate().is_err());

        let bad_risk = AnalysisConfig {
            risk_moderate_rate: 0.5,
            risk_high_rate: 0.2,
            ..AnalysisConfig::default()
        };
        assert!(bad_risk.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "[analysis]\nforecast_horizon = 21\n").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.analysis.forecast_horizon, 21);

        std::fs::write(&path, "[analysis]\nrolling_window = 0\n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("rolling_window must be at least 2"));
    }
}
