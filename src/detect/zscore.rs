use crate::series::features::FeatureFrame;

/// Relative spread below which a window is treated as constant.
const STD_EPSILON: f64 = 1e-9;

/// Z-score outcome for one frame row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    pub value: f64,
    pub flagged: bool,
}

/// Flags rows whose value sits more than `threshold` rolling standard
/// deviations away from the rolling mean.
#[derive(Debug, Clone, Copy)]
pub struct ZScoreDetector {
    pub threshold: f64,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Z = (cases - mean) / std, or 0 when the window is constant.
    pub fn score(cases: f64, mean: f64, std: f64) -> f64 {
        if std <= STD_EPSILON * mean.abs().max(1.0) {
            return 0.0;
        }
        (cases - mean) / std
    }

    /// One entry per frame row; `None` inside the warm-up window.
    pub fn detect(&self, frame: &FeatureFrame) -> Vec<Option<ZScore>> {
        frame
            .rows()
            .iter()
            .map(|row| {
                let (mean, std) = (row.rolling_mean?, row.rolling_std?);
                let value = Self::score(row.cases, mean, std);
                Some(ZScore {
                    value,
                    flagged: value.abs() > self.threshold,
                })
            })
            .collect()
    }
}
