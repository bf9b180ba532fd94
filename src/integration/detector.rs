//! Trait for per-frame detection sources.

use crate::tracker::Detection;

/// Trait for anything that produces per-frame detections: a segmentation
/// stage, a file reader, a replay of recorded data.
///
/// # Example
///
/// ```ignore
/// use laptrack_rs::integration::DetectionSource;
/// use laptrack_rs::Detection;
///
/// struct MySegmenter {
///     // Your image stack here
/// }
///
/// impl DetectionSource for MySegmenter {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: u32) -> Result<Vec<Detection>, Self::Error> {
///         // Segment the frame and return one record per object
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::error::Error + 'static;

    /// Produce the detections observed at `frame`.
    fn detect(&mut self, frame: u32) -> Result<Vec<Detection>, Self::Error>;
}

/// Helper trait for converting source-specific outputs to `Detection`s.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

impl<S> IntoDetections for Vec<Vec<(S, crate::tracker::Value)>>
where
    S: Into<String>,
{
    fn into_detections(self) -> Vec<Detection> {
        self.into_iter()
            .map(|record| record.into_iter().map(|(k, v)| (k.into(), v)).collect())
            .collect()
    }
}
