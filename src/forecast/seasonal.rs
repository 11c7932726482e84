//! Piecewise-linear trend with Fourier seasonality.
//!
//! The trend is linear in scaled time with a set of potential changepoints
//! spread over the first 80% of the history. Weekly seasonality is always
//! modeled; yearly seasonality only once the history covers a full year.
//! Changepoint and seasonal coefficients carry Gaussian priors, so the fit is
//! a ridge regression with penalty `noise_variance / prior_scale²` per
//! column. In multiplicative mode the seasonal columns are scaled by a first
//! trend-only estimate so the weekly swing grows with the level.

use chrono::{Datelike, Duration, NaiveDate};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use super::linalg::ridge_solve;
use super::{ForecastPoint, SeriesForecaster};
use crate::config::{AnalysisConfig, SeasonalityMode};
use crate::error::AnalysisError;
use crate::series::CaseSeries;

const MAX_CHANGEPOINTS: usize = 25;
const CHANGEPOINT_RANGE: f64 = 0.8;
const WEEKLY_PERIOD: f64 = 7.0;
const WEEKLY_ORDER: usize = 3;
const YEARLY_PERIOD: f64 = 365.25;
const YEARLY_ORDER: usize = 10;
/// Noise variance floor in scaled units, keeps penalties positive on
/// perfectly regular input.
const VARIANCE_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone)]
pub struct SeasonalForecaster {
    pub mode: SeasonalityMode,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    /// Central probability mass of the reported interval.
    pub interval_width: f64,
    /// History span (days) needed before yearly terms are added.
    pub yearly_min_days: i64,
}

impl SeasonalForecaster {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            mode: config.seasonality_mode,
            changepoint_prior_scale: config.changepoint_prior_scale,
            seasonality_prior_scale: config.seasonality_prior_scale,
            interval_width: config.forecast_interval_width,
            yearly_min_days: config.yearly_seasonality_min_days,
        }
    }

    fn singular(&self) -> AnalysisError {
        AnalysisError::model_fitting(self.name(), "normal equations are singular")
    }
}

impl SeriesForecaster for SeasonalForecaster {
    fn name(&self) -> &'static str {
        "seasonal-trend"
    }

    fn fit_and_forecast(
        &self,
        series: &CaseSeries,
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, AnalysisError> {
        let n = series.len();
        if n < 2 {
            return Err(AnalysisError::model_fitting(
                self.name(),
                format!("need at least 2 days of history, have {n}"),
            ));
        }
        let values = series.values();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::model_fitting(
                self.name(),
                "history contains non-finite values",
            ));
        }

        let peak = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let scale = if peak > 0.0 { peak } else { 1.0 };
        let y: Vec<f64> = values.iter().map(|v| v / scale).collect();

        let last = (n - 1) as f64;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / last).collect();
        let span_days = (series.end_date() - series.start_date()).num_days();
        let basis = Basis::new(n, span_days >= self.yearly_min_days);

        let noise = linear_residual_variance(&t, &y).max(VARIANCE_FLOOR);
        let mut trend_penalty = vec![0.0, 0.0];
        trend_penalty.resize(
            basis.trend_width(),
            noise / self.changepoint_prior_scale.powi(2),
        );
        let season_penalty = noise / self.seasonality_prior_scale.powi(2);

        let trend_rows: Vec<Vec<f64>> = t.iter().map(|&ti| basis.trend(ti)).collect();

        let level_beta = match self.mode {
            SeasonalityMode::Additive => None,
            SeasonalityMode::Multiplicative => Some(
                ridge_solve(&trend_rows, &y, &trend_penalty).ok_or_else(|| self.singular())?,
            ),
        };
        let level = |trend_row: &[f64]| match &level_beta {
            None => 1.0,
            Some(beta) => dot(trend_row, beta).max(0.0),
        };

        let design: Vec<Vec<f64>> = trend_rows
            .iter()
            .enumerate()
            .map(|(i, trend_row)| basis.row(trend_row, series.date_at(i), level(trend_row)))
            .collect();
        let mut penalty = trend_penalty;
        penalty.resize(penalty.len() + basis.seasonal_width(), season_penalty);

        let beta = ridge_solve(&design, &y, &penalty).ok_or_else(|| self.singular())?;

        let rss: f64 = design
            .iter()
            .zip(&y)
            .map(|(row, &yi)| (yi - dot(row, &beta)).powi(2))
            .sum();
        let sigma = (rss / n.saturating_sub(2).max(1) as f64).sqrt() * scale;

        let t_mean = t.iter().sum::<f64>() / n as f64;
        let s_tt: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
        let z = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::Internal(e.to_string()))?
            .inverse_cdf(0.5 + self.interval_width / 2.0);

        let end = series.end_date();
        let mut points = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let th = (n - 1 + h) as f64 / last;
            let date = end + Duration::days(h as i64);
            let trend_row = basis.trend(th);
            let row = basis.row(&trend_row, date, level(&trend_row));

            let mean = dot(&row, &beta) * scale;
            let spread = z * sigma * (1.0 + 1.0 / n as f64 + (th - t_mean).powi(2) / s_tt).sqrt();
            if !(mean.is_finite() && spread.is_finite()) {
                return Err(AnalysisError::model_fitting(
                    self.name(),
                    format!("non-finite prediction for {date}"),
                ));
            }
            points.push(ForecastPoint::clamped(date, mean, mean - spread, mean + spread));
        }

        debug!(
            model = self.name(),
            history = n,
            horizon,
            changepoints = basis.changepoints.len(),
            yearly = basis.yearly,
            sigma,
            "forecast fitted"
        );
        Ok(points)
    }
}

/// Column layout shared by the fit and the extrapolation.
struct Basis {
    changepoints: Vec<f64>,
    yearly: bool,
}

impl Basis {
    fn new(n: usize, yearly: bool) -> Self {
        let history = (CHANGEPOINT_RANGE * n as f64).floor() as usize;
        let k = MAX_CHANGEPOINTS.min(history.saturating_sub(1));
        let changepoints = (1..=k)
            .map(|j| CHANGEPOINT_RANGE * j as f64 / k as f64)
            .collect();
        Self {
            changepoints,
            yearly,
        }
    }

    fn trend_width(&self) -> usize {
        2 + self.changepoints.len()
    }

    fn seasonal_width(&self) -> usize {
        2 * WEEKLY_ORDER + if self.yearly { 2 * YEARLY_ORDER } else { 0 }
    }

    /// `[1, t, max(0, t - s_1), ..]`
    fn trend(&self, t: f64) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.trend_width());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
        row
    }

    fn row(&self, trend_row: &[f64], date: NaiveDate, level: f64) -> Vec<f64> {
        let day = f64::from(date.num_days_from_ce());
        let mut row = Vec::with_capacity(self.trend_width() + self.seasonal_width());
        row.extend_from_slice(trend_row);
        fourier(day, WEEKLY_PERIOD, WEEKLY_ORDER, level, &mut row);
        if self.yearly {
            fourier(day, YEARLY_PERIOD, YEARLY_ORDER, level, &mut row);
        }
        row
    }
}

fn fourier(day: f64, period: f64, order: usize, level: f64, out: &mut Vec<f64>) {
    for m in 1..=order {
        let angle = 2.0 * std::f64::consts::PI * m as f64 * day / period;
        out.push(level * angle.sin());
        out.push(level * angle.cos());
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Residual variance of an ordinary straight-line fit.
fn linear_residual_variance(t: &[f64], y: &[f64]) -> f64 {
    let n = t.len() as f64;
    let t_mean = t.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let s_tt: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
    let s_ty: f64 = t.iter().zip(y).map(|(ti, yi)| (ti - t_mean) * (yi - y_mean)).sum();
    let slope = if s_tt > 0.0 { s_ty / s_tt } else { 0.0 };
    let rss: f64 = t
        .iter()
        .zip(y)
        .map(|(ti, yi)| (yi - y_mean - slope * (ti - t_mean)).powi(2))
        .sum();
    rss / n
}
