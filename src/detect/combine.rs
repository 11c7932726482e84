use tracing::info;

use super::zscore::ZScore;
use super::{AnomalyRecord, DetectionMethod};
use crate::series::features::FeatureFrame;

/// Ensemble outcome for one frame row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleFlag {
    pub score: f64,
    pub flagged: bool,
}

/// Union of both detectors plus the counts the statistics need.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedAnomalies {
    pub records: Vec<AnomalyRecord>,
    pub z_score_count: usize,
    pub ensemble_count: usize,
    /// Dates flagged by both detectors.
    pub agreement_count: usize,
    /// Rows with a complete feature vector.
    pub evaluated_points: usize,
}

/// Merge per-row detector outputs. Both slices are index-aligned with the
/// frame; a date is anomalous when either detector flags it.
pub fn combine(
    frame: &FeatureFrame,
    z_scores: &[Option<ZScore>],
    ensemble: &[Option<EnsembleFlag>],
) -> CombinedAnomalies {
    let mut records = Vec::new();
    let (mut z_count, mut e_count, mut both) = (0, 0, 0);

    for (i, row) in frame.rows().iter().enumerate() {
        let z = z_scores.get(i).copied().flatten();
        let e = ensemble.get(i).copied().flatten();
        let z_hit = z.is_some_and(|z| z.flagged);
        let e_hit = e.is_some_and(|e| e.flagged);

        z_count += usize::from(z_hit);
        e_count += usize::from(e_hit);
        both += usize::from(z_hit && e_hit);
        if !(z_hit || e_hit) {
            continue;
        }

        let mut detected_by = Vec::with_capacity(2);
        if z_hit {
            detected_by.push(DetectionMethod::ZScore);
        }
        if e_hit {
            detected_by.push(DetectionMethod::IsolationForest);
        }

        records.push(AnomalyRecord {
            date: row.date,
            cases: row.cases,
            rolling_mean: row.rolling_mean.unwrap_or(row.cases),
            z_score: z.map_or(0.0, |z| z.value),
            anomaly_score: e.map_or(0.0, |e| e.score),
            detected_by,
        });
    }

    info!(
        z_score = z_count,
        isolation_forest = e_count,
        both,
        combined = records.len(),
        "combined anomaly signals"
    );

    CombinedAnomalies {
        records,
        z_score_count: z_count,
        ensemble_count: e_count,
        agreement_count: both,
        evaluated_points: frame.defined_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{normalize, RawSample};
    use chrono::{Duration, NaiveDate};

    fn frame(n: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let samples: Vec<RawSample> = (0..n)
            .map(|i| RawSample::new(start + Duration::days(i as i64), (i * 7 % 13) as f64))
            .collect();
        FeatureFrame::compute(&normalize(&samples, 1, usize::MAX).unwrap(), 3)
    }

    fn z(value: f64, flagged: bool) -> Option<ZScore> {
        Some(ZScore { value, flagged })
    }

    fn e(score: f64, flagged: bool) -> Option<EnsembleFlag> {
        Some(EnsembleFlag { score, flagged })
    }

    #[test]
    fn test_union_keeps_both_metrics() {
        let f = frame(8);
        let zs = vec![None, None, z(0.1, false), z(3.0, true), z(2.8, true), z(0.0, false), z(0.2, false), z(0.3, false)];
        let es = vec![None, None, e(-0.4, false), e(-0.7, true), e(-0.45, false), e(-0.6, true), e(-0.4, false), e(-0.41, false)];

        let out = combine(&f, &zs, &es);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.z_score_count, 2);
        assert_eq!(out.ensemble_count, 2);
        assert_eq!(out.agreement_count, 1);
        assert_eq!(out.evaluated_points, 6);

        let both = &out.records[0];
        assert_eq!(both.date, f.rows()[3].date);
        assert_eq!(
            both.detected_by,
            vec![DetectionMethod::ZScore, DetectionMethod::IsolationForest]
        );

        let z_only = &out.records[1];
        assert_eq!(z_only.detected_by, vec![DetectionMethod::ZScore]);
        assert_eq!(z_only.anomaly_score, -0.45);

        let e_only = &out.records[2];
        assert_eq!(e_only.detected_by, vec![DetectionMethod::IsolationForest]);
        assert_eq!(e_only.z_score, 0.0);
        assert_eq!(e_only.anomaly_score, -0.6);
    }

    #[test]
    fn test_count_bounds() {
        let f = frame(20);
        let zs: Vec<Option<ZScore>> = (0..20).map(|i| z(0.0, i % 3 == 0)).collect();
        let es: Vec<Option<EnsembleFlag>> = (0..20).map(|i| e(-0.5, i % 4 == 0)).collect();
        let out = combine(&f, &zs, &es);
        let combined = out.records.len();
        assert!(combined >= out.z_score_count.max(out.ensemble_count));
        assert!(combined <= out.z_score_count + out.ensemble_count);
        assert_eq!(combined, out.z_score_count + out.ensemble_count - out.agreement_count);
    }

    #[test]
    fn test_detected_by_serializes_method_names() {
        let json = serde_json::to_string(&vec![DetectionMethod::ZScore, DetectionMethod::IsolationForest]).unwrap();
        assert_eq!(json, r#"["z-score","isolation-forest"]"#);
    }
}
