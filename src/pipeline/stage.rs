use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::error::{AnalysisError, ErrorKind};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Stage {
    Normalizing,
    FeatureComputing,
    Detecting,
    Combining,
    Forecasting,
    Aggregating,
    Explaining,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Normalizing,
        Stage::FeatureComputing,
        Stage::Detecting,
        Stage::Combining,
        Stage::Forecasting,
        Stage::Aggregating,
        Stage::Explaining,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Normalizing => "normalizing",
            Stage::FeatureComputing => "feature_computing",
            Stage::Detecting => "detecting",
            Stage::Combining => "combining",
            Stage::Forecasting => "forecasting",
            Stage::Aggregating => "aggregating",
            Stage::Explaining => "explaining",
        }
    }

    fn from_u8(raw: u8) -> Stage {
        Stage::ALL
            .get(raw as usize)
            .copied()
            .unwrap_or(Stage::Explaining)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one run. Every run ends in `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running(Stage),
    Done,
    Failed { stage: Stage, kind: ErrorKind },
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running(stage) => write!(f, "running({stage})"),
            RunState::Done => f.write_str("done"),
            RunState::Failed { stage, kind } => write!(f, "failed({stage}: {kind})"),
        }
    }
}

/// Tracks the active stage so a deadline can report where it fired.
#[derive(Debug, Default)]
pub(crate) struct StageTracker(AtomicU8);

impl StageTracker {
    pub(crate) fn enter(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Release);
        debug!(state = %RunState::Running(stage), "stage started");
    }

    pub(crate) fn current(&self) -> Stage {
        Stage::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn fail(&self, source: AnalysisError) -> PipelineError {
        PipelineError::new(self.current(), source)
    }
}

/// An [`AnalysisError`] tagged with the stage that produced it.
#[derive(Debug, Clone, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: AnalysisError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: AnalysisError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn state(&self) -> RunState {
        RunState::Failed {
            stage: self.stage,
            kind: self.kind(),
        }
    }
}
