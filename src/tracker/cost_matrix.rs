//! Augmented square cost matrix for frame-to-frame linking.
//!
//! For `n` active tracks and `m` detections the matrix is `(n + m) x (m + n)`:
//!
//! ```text
//!             m detections        n no-link slots
//! n tracks  [ link scores       | alt on diagonal ]
//! m births  [ alt on diagonal   | filler (link^T) ]
//! ```
//!
//! Every off-diagonal entry of the two alternative blocks is infinite.

use ndarray::{Array2, ArrayView2, s};

use crate::error::Result;
use crate::tracker::attribute::Value;
use crate::tracker::metric::{Metric, ScoreRange};

/// Alternative (no-link / birth) cost relative to the worst plausible link.
pub const ALT_COST_MARGIN: f64 = 1.05;

/// Gated link scores between previous track values and new detections.
///
/// Returns a matrix of shape (tracks, detections); entries outside `range`
/// are infinite.
pub fn link_scores(
    track_values: &[&Value],
    detection_values: &[&Value],
    metric: Metric,
    range: ScoreRange,
) -> Result<Array2<f64>> {
    let mut scores = Array2::from_elem((track_values.len(), detection_values.len()), f64::INFINITY);
    for (i, prev) in track_values.iter().enumerate() {
        let row = metric.score(prev, detection_values)?;
        for (j, score) in row.into_iter().enumerate() {
            scores[[i, j]] = range.gate(score);
        }
    }
    Ok(scores)
}

#[derive(Debug, Clone)]
pub struct LinkCostMatrix {
    costs: Array2<f64>,
    n_tracks: usize,
    n_detections: usize,
    alt_cost: f64,
}

impl LinkCostMatrix {
    /// Build the augmented matrix.
    ///
    /// Returns `Ok(None)` when no gated link is finite: there is nothing to
    /// solve, every detection starts a track and every track goes unmatched.
    pub fn build(
        track_values: &[&Value],
        detection_values: &[&Value],
        metric: Metric,
        range: ScoreRange,
    ) -> Result<Option<Self>> {
        let links = link_scores(track_values, detection_values, metric, range)?;
        Ok(Self::from_link_scores(links))
    }

    /// Assemble the augmented matrix from an already gated link block.
    pub fn from_link_scores(links: Array2<f64>) -> Option<Self> {
        let (n_tracks, n_detections) = links.dim();

        let mut min_link = f64::INFINITY;
        let mut max_link = f64::NEG_INFINITY;
        for &c in links.iter().filter(|c| c.is_finite()) {
            min_link = min_link.min(c);
            max_link = max_link.max(c);
        }
        if !max_link.is_finite() {
            return None;
        }

        // A zero worst link would make opting out free; keep the
        // alternative strictly positive.
        let alt_cost = if max_link > 0.0 {
            ALT_COST_MARGIN * max_link
        } else {
            ALT_COST_MARGIN
        };

        let size = n_tracks + n_detections;
        let mut costs = Array2::from_elem((size, size), f64::INFINITY);

        costs
            .slice_mut(s![..n_tracks, ..n_detections])
            .assign(&links);

        for i in 0..n_tracks {
            costs[[i, n_detections + i]] = alt_cost;
        }
        for j in 0..n_detections {
            costs[[n_tracks + j, j]] = alt_cost;
        }

        let filler = links.t().mapv(|c| if c.is_finite() { min_link } else { f64::INFINITY });
        costs
            .slice_mut(s![n_tracks.., n_detections..])
            .assign(&filler);

        Some(Self {
            costs,
            n_tracks,
            n_detections,
            alt_cost,
        })
    }

    pub fn costs(&self) -> ArrayView2<'_, f64> {
        self.costs.view()
    }

    /// The gated track x detection block.
    pub fn link_block(&self) -> ArrayView2<'_, f64> {
        self.costs.slice(s![..self.n_tracks, ..self.n_detections])
    }

    pub fn n_tracks(&self) -> usize {
        self.n_tracks
    }

    pub fn n_detections(&self) -> usize {
        self.n_detections
    }

    pub fn alt_cost(&self) -> f64 {
        self.alt_cost
    }

    /// Whether column `col` is a real detection (as opposed to a no-link slot).
    #[inline]
    pub fn is_detection_column(&self, col: usize) -> bool {
        col < self.n_detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn centroids(points: &[[f64; 2]]) -> Vec<Value> {
        points.iter().map(|p| Value::from(*p)).collect()
    }

    #[test]
    fn test_block_layout() {
        let tracks = centroids(&[[1.0, 1.0], [10.0, 10.0]]);
        let dets = centroids(&[[1.0, 2.0], [10.0, 13.0], [50.0, 50.0]]);
        let track_refs: Vec<&Value> = tracks.iter().collect();
        let det_refs: Vec<&Value> = dets.iter().collect();

        let m = LinkCostMatrix::build(
            &track_refs,
            &det_refs,
            Metric::Euclidean,
            ScoreRange::new(0.0, 5.0),
        )
        .unwrap()
        .unwrap();

        assert_eq!(m.costs().dim(), (5, 5));
        assert_abs_diff_eq!(m.alt_cost(), 3.15, epsilon = 1e-12);

        let c = m.costs();
        // Link block, gated.
        assert_abs_diff_eq!(c[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[1, 1]], 3.0, epsilon = 1e-12);
        assert_eq!(c[[0, 2]], f64::INFINITY);
        assert_eq!(c[[1, 0]], f64::INFINITY);
        // No-link diagonal.
        assert_eq!(c[[0, 3]], m.alt_cost());
        assert_eq!(c[[1, 4]], m.alt_cost());
        assert_eq!(c[[0, 4]], f64::INFINITY);
        // Birth diagonal.
        assert_eq!(c[[2, 0]], m.alt_cost());
        assert_eq!(c[[4, 2]], m.alt_cost());
        assert_eq!(c[[3, 0]], f64::INFINITY);
        // Filler is the transposed link pattern at the minimum link cost.
        assert_abs_diff_eq!(c[[2, 3]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[[3, 4]], 1.0, epsilon = 1e-12);
        assert_eq!(c[[4, 3]], f64::INFINITY);
        assert_eq!(c[[3, 3]], f64::INFINITY);
    }

    #[test]
    fn test_no_plausible_link_short_circuits() {
        let tracks = centroids(&[[0.0, 0.0]]);
        let dets = centroids(&[[100.0, 100.0]]);
        let m = LinkCostMatrix::build(
            &[&tracks[0]],
            &[&dets[0]],
            Metric::Euclidean,
            ScoreRange::new(0.0, 10.0),
        )
        .unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_empty_sides_short_circuit() {
        let dets = centroids(&[[1.0, 1.0]]);
        let m = LinkCostMatrix::build(&[], &[&dets[0]], Metric::Euclidean, ScoreRange::unbounded())
            .unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_zero_cost_link_keeps_positive_alt() {
        let v = Value::from([2.0, 2.0]);
        let m = LinkCostMatrix::build(&[&v], &[&v], Metric::Euclidean, ScoreRange::unbounded())
            .unwrap()
            .unwrap();
        assert!(m.alt_cost() > 0.0);
        assert_eq!(m.link_block()[[0, 0]], 0.0);
    }

    #[test]
    fn test_metric_errors_propagate() {
        let a = Value::from([0.0, 0.0]);
        let b = Value::from([0.0, 0.0, 0.0]);
        assert!(LinkCostMatrix::build(&[&a], &[&b], Metric::Euclidean, ScoreRange::unbounded()).is_err());
    }
}
