//! Isolation forest over the rolling feature vectors.
//!
//! Each tree recursively splits a subsample on a random feature at a random
//! value inside the node's observed range. Points that are isolated after few
//! splits are anomalous. Scores follow Liu et al. (2008) and are negated so
//! that lower means more anomalous; the decision threshold is the
//! contamination quantile of the training scores.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{AnomalyScorer, EnsembleScores};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::series::features::{FeatureVector, FEATURE_COUNT};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub n_trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl IsolationForest {
    pub fn new(n_trees: usize, max_samples: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_trees,
            max_samples,
            contamination,
            seed,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.ensemble_tree_count,
            config.ensemble_max_samples,
            config.isolation_forest_contamination,
            config.random_seed,
        )
    }

    fn grow(&self, rows: &[FeatureVector]) -> Vec<IsolationTree> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let sample_size = self.max_samples.min(rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        (0..self.n_trees)
            .map(|_| {
                let sample: Vec<FeatureVector> = index::sample(&mut rng, rows.len(), sample_size)
                    .into_iter()
                    .map(|i| rows[i])
                    .collect();
                IsolationTree::build(&sample, max_depth, &mut rng)
            })
            .collect()
    }
}

impl AnomalyScorer for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation-forest"
    }

    fn fit_and_score(&self, rows: &[FeatureVector]) -> Result<EnsembleScores, AnalysisError> {
        if rows.len() < 2 {
            return Err(AnalysisError::model_fitting(
                self.name(),
                format!("need at least 2 feature rows, have {}", rows.len()),
            ));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AnalysisError::model_fitting(
                self.name(),
                "feature rows contain non-finite values",
            ));
        }
        if self.n_trees == 0 {
            return Err(AnalysisError::model_fitting(self.name(), "ensemble has no trees"));
        }

        let trees = self.grow(rows);
        let norm = average_path_length(self.max_samples.min(rows.len()));

        let scores: Vec<f64> = rows
            .iter()
            .map(|row| {
                let mean_depth =
                    trees.iter().map(|t| t.path_length(row)).sum::<f64>() / trees.len() as f64;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect();

        let threshold = quantile(&scores, self.contamination);
        let flags: Vec<bool> = scores.iter().map(|&s| s < threshold).collect();

        let result = EnsembleScores {
            scores,
            flags,
            threshold,
        };
        debug!(
            rows = rows.len(),
            trees = trees.len(),
            threshold,
            flagged = result.flagged_count(),
            "isolation forest scored"
        );
        Ok(result)
    }
}

/// A single isolation tree node.
#[derive(Debug)]
enum IsolationTree {
    Internal {
        feature: usize,
        split: f64,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationTree {
    fn build(data: &[FeatureVector], depth_left: usize, rng: &mut StdRng) -> Self {
        if depth_left == 0 || data.len() <= 1 {
            return IsolationTree::Leaf { size: data.len() };
        }

        // Only features that still vary inside this node can split it.
        let ranges: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let (lo, hi) = data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, row| {
                    (acc.0.min(row[f]), acc.1.max(row[f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if ranges.is_empty() {
            return IsolationTree::Leaf { size: data.len() };
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let split = rng.gen_range(lo..hi);

        let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) =
            data.iter().partition(|row| row[feature] < split);
        // gen_range may return `lo` exactly, which sends every row right.
        if left.is_empty() || right.is_empty() {
            return IsolationTree::Leaf { size: data.len() };
        }

        IsolationTree::Internal {
            feature,
            split,
            left: Box::new(IsolationTree::build(&left, depth_left - 1, rng)),
            right: Box::new(IsolationTree::build(&right, depth_left - 1, rng)),
        }
    }

    /// Depth at which `point` lands plus the expected depth of its leaf.
    fn path_length(&self, point: &FeatureVector) -> f64 {
        let mut node = self;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationTree::Leaf { size } => return depth as f64 + average_path_length(*size),
                IsolationTree::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *split { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in [0, 1].
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<FeatureVector> {
        let mut rows: Vec<FeatureVector> = (0..80)
            .map(|i| {
                let x = 100.0 + (i % 5) as f64;
                [x, 101.0 + (i % 3) as f64 * 0.5, 1.5 + (i % 4) as f64 * 0.1, (i % 7) as f64 * 0.1 - 0.3]
            })
            .collect();
        rows[40] = [900.0, 220.0, 300.0, 90.0];
        rows
    }

    #[test]
    fn test_outlier_scores_lowest_and_is_flagged() {
        let rows = cluster_with_outlier();
        let forest = IsolationForest::new(100, 256, 0.1, 42);
        let out = forest.fit_and_score(&rows).unwrap();

        assert_eq!(out.scores.len(), rows.len());
        let min_idx = out
            .scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(min_idx, 40);
        assert!(out.flags[40]);
        assert!(out.scores.iter().all(|&s| (-1.0..0.0).contains(&s)));
    }

    #[test]
    fn test_contamination_bounds_flag_count() {
        let rows = cluster_with_outlier();
        let out = IsolationForest::new(100, 256, 0.1, 7)
            .fit_and_score(&rows)
            .unwrap();
        // Strictly below the 10% quantile: at most ceil(0.1 * (n - 1)) rows.
        assert!(out.flagged_count() >= 1);
        assert!(out.flagged_count() <= 8);
    }

    #[test]
    fn test_same_seed_same_flags() {
        let rows = cluster_with_outlier();
        let a = IsolationForest::new(50, 64, 0.1, 1234).fit_and_score(&rows).unwrap();
        let b = IsolationForest::new(50, 64, 0.1, 1234).fit_and_score(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_rows_flag_nothing() {
        let rows = vec![[5.0, 5.0, 0.0, 0.0]; 34];
        let out = IsolationForest::new(100, 256, 0.1, 42).fit_and_score(&rows).unwrap();
        assert_eq!(out.flagged_count(), 0);
        assert!(out.scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let forest = IsolationForest::new(10, 256, 0.1, 42);
        let err = forest.fit_and_score(&[[1.0, 1.0, 0.0, 0.0]]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelFitting);

        let err = forest
            .fit_and_score(&[[1.0, f64::NAN, 0.0, 0.0], [2.0, 1.0, 0.0, 0.0]])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ModelFitting);
    }

    #[test]
    fn test_average_path_length_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.24).abs() < 0.01, "c(256) = {c256}");
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 0.5), 3.0);
        assert!((quantile(&v, 0.1) - 1.4).abs() < 1e-12);
    }
}
