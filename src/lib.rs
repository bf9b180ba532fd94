//! Online linear-assignment tracking with lineage (division) detection.
//!
//! Detections arrive one frame at a time as tables of named attributes.
//! [`LapLinker`] links them to the active tracks by solving an augmented
//! linear assignment problem, starts new tracks for unmatched detections,
//! retires stale tracks, and records mother/daughter divisions.

pub mod error;
pub mod integration;
pub mod tracker;

pub use error::{PipelineError, Result, TrackError};
pub use tracker::{Detection, LapLinker, LinkerConfig, Solver, TrackArray, TrackId, Value};
