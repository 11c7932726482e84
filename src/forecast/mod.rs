//! Short-horizon case forecasting.

mod linalg;
pub mod seasonal;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::series::CaseSeries;

pub use seasonal::SeasonalForecaster;

/// One forecast day. Invariant: `0 <= lower_bound <= forecast <= upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl ForecastPoint {
    /// Build a point from raw model output, clamping at zero since case
    /// counts cannot be negative.
    pub fn clamped(date: NaiveDate, mean: f64, lower: f64, upper: f64) -> Self {
        let forecast = mean.max(0.0);
        Self {
            date,
            forecast,
            lower_bound: lower.min(mean).max(0.0),
            upper_bound: upper.max(forecast),
        }
    }
}

/// Capability seam for the forecasting model.
pub trait SeriesForecaster: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fit on the full history and predict `horizon` days past its end.
    fn fit_and_forecast(
        &self,
        series: &CaseSeries,
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_point_keeps_ordering() {
        let d = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let p = ForecastPoint::clamped(d, 10.0, 4.0, 16.0);
        assert_eq!((p.lower_bound, p.forecast, p.upper_bound), (4.0, 10.0, 16.0));

        let p = ForecastPoint::clamped(d, 3.0, -5.0, 11.0);
        assert_eq!(p.lower_bound, 0.0);
        assert_eq!(p.forecast, 3.0);

        let p = ForecastPoint::clamped(d, -2.0, -9.0, 5.0);
        assert_eq!((p.lower_bound, p.forecast, p.upper_bound), (0.0, 0.0, 5.0));

        let p = ForecastPoint::clamped(d, -8.0, -12.0, -4.0);
        assert_eq!((p.lower_bound, p.forecast, p.upper_bound), (0.0, 0.0, 0.0));
    }
}
