//! TrackerPipeline for combining a detection source with the linker.

use std::ops::RangeInclusive;

use crate::error::PipelineError;
use crate::tracker::{FrameSummary, LapLinker, LinkerConfig, Solver, TrackArray};

use super::DetectionSource;

/// Drives a [`LapLinker`] from any [`DetectionSource`], one frame at a time.
pub struct TrackerPipeline<D: DetectionSource> {
    detector: D,
    linker: LapLinker,
}

impl<D: DetectionSource> TrackerPipeline<D> {
    /// Create a new tracking pipeline with the given source and linker config.
    pub fn new(detector: D, config: LinkerConfig) -> Self {
        Self {
            detector,
            linker: LapLinker::new(config),
        }
    }

    /// Create a new tracking pipeline with default linker configuration.
    pub fn with_default_config(detector: D) -> Self {
        Self::new(detector, LinkerConfig::default())
    }

    /// Use `solver` instead of the one named in the config.
    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.linker.set_solver(solver);
        self
    }

    /// Detect and link a single frame.
    pub fn process_frame(&mut self, frame: u32) -> Result<FrameSummary, PipelineError<D::Error>> {
        let detections = self
            .detector
            .detect(frame)
            .map_err(|source| PipelineError::Source { frame, source })?;
        Ok(self.linker.assign_frame(frame, &detections)?)
    }

    /// Process every frame in `frames`, stopping at the first error.
    pub fn run(
        &mut self,
        frames: RangeInclusive<u32>,
    ) -> Result<Vec<FrameSummary>, PipelineError<D::Error>> {
        let summaries = frames
            .map(|frame| self.process_frame(frame))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "processed {} frames, {} tracks",
            summaries.len(),
            self.linker.num_tracks()
        );
        Ok(summaries)
    }

    /// Get a reference to the underlying detection source.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detection source.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying linker.
    pub fn linker(&self) -> &LapLinker {
        &self.linker
    }

    /// Get a mutable reference to the underlying linker.
    pub fn linker_mut(&mut self) -> &mut LapLinker {
        &mut self.linker
    }

    /// Consume the pipeline and return the tracks.
    pub fn into_tracks(self) -> TrackArray {
        self.linker.into_tracks()
    }
}
