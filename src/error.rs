//! Error types for the tracker.

use thiserror::Error;

use crate::tracker::TrackId;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Errors raised by the tracker core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("unknown assignment solver: {0}")]
    UnknownSolver(String),

    #[error("unknown score metric: {0}")]
    UnknownMetric(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("detection {detection} has no value for link field '{field}'")]
    MissingLinkField { field: String, detection: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("metric '{metric}' cannot score a {found} value")]
    IncompatibleValue {
        metric: &'static str,
        found: &'static str,
    },

    #[error("invalid cost matrix: {0}")]
    InvalidCostMatrix(String),

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("frame {frame} not found in track {track}")]
    FrameNotFound { track: TrackId, frame: u32 },

    #[error("cannot split track {track} at frame {frame}: {reason}")]
    InvalidSplit {
        track: TrackId,
        frame: u32,
        reason: &'static str,
    },

    #[error("cannot join track {tail} onto track {head}: {reason}")]
    InvalidJoin {
        head: TrackId,
        tail: TrackId,
        reason: &'static str,
    },
}

impl TrackError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn cost_matrix<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCostMatrix(msg.into())
    }

    pub fn assignment<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAssignment(msg.into())
    }
}

/// Errors from a [`TrackerPipeline`](crate::integration::TrackerPipeline) run.
#[derive(Error, Debug)]
pub enum PipelineError<E>
where
    E: std::error::Error + 'static,
{
    #[error("detection source failed at frame {frame}: {source}")]
    Source {
        frame: u32,
        #[source]
        source: E,
    },

    #[error(transparent)]
    Tracking(#[from] TrackError),
}
