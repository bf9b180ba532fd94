//! Integration module for feeding detections from external sources into the
//! linker.
//!
//! Segmentation, file readers and other producers of per-frame detections
//! plug in through [`DetectionSource`]; [`TrackerPipeline`] drives the
//! linker from one.

mod builder;
mod detector;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections};
pub use pipeline::TrackerPipeline;
