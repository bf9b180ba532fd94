//! Online LAP linker: drives the per-frame track lifecycle.
//!
//! Each call to [`LapLinker::assign_frame`] builds the augmented cost
//! matrix for the active tracks and the new detections, solves it, links
//! matched detections, retires tracks that stayed unmatched for too long,
//! starts tracks for unmatched detections, and optionally detects divisions.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::tracker::attribute::{CENTROID, Detection, Value};
use crate::tracker::cost_matrix::LinkCostMatrix;
use crate::tracker::jonker_volgenant::LapJv;
use crate::tracker::metric::{Metric, ScoreRange};
use crate::tracker::solver::{AssignmentSolver, Solver};
use crate::tracker::track_array::TrackArray;
use crate::tracker::track_data::{TrackId, TrackView};
use crate::tracker::track_state::TrackState;

/// Configuration for the [`LapLinker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Attribute used to score links.
    pub link_field: String,
    pub link_metric: Metric,
    /// Links scoring outside this range are forbidden.
    pub link_score_range: ScoreRange,
    /// A track unmatched for more than this many frames is retired.
    pub max_track_age: u32,
    pub track_division: bool,
    /// Attribute used to score division candidates.
    pub division_field: String,
    pub division_metric: Metric,
    pub division_score_range: ScoreRange,
    /// A track that is itself a daughter cannot divide again until it is
    /// at least this many frames old.
    pub min_frames_between_div: u32,
    /// Which earlier frame of a candidate mother is compared against a new
    /// track: 1 is the latest recorded frame before the current one.
    pub division_frame_offset: usize,
    /// Solver name, `"lapjv"` or `"munkres"`.
    pub solver: String,
    /// Tie tolerance for the Jonker-Volgenant solver; `None` picks one from
    /// the cost range.
    pub solver_epsilon: Option<f64>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            link_field: CENTROID.to_string(),
            link_metric: Metric::Euclidean,
            link_score_range: ScoreRange::new(0.0, 50.0),
            max_track_age: 2,
            track_division: false,
            division_field: CENTROID.to_string(),
            division_metric: Metric::Euclidean,
            division_score_range: ScoreRange::new(0.0, 20.0),
            min_frames_between_div: 3,
            division_frame_offset: 1,
            solver: "lapjv".to_string(),
            solver_epsilon: None,
        }
    }
}

impl LinkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.link_field.is_empty() {
            return Err(TrackError::config("link_field is empty"));
        }
        if !self.link_score_range.is_valid() {
            return Err(TrackError::config(format!(
                "invalid link_score_range [{}, {}]",
                self.link_score_range.min, self.link_score_range.max
            )));
        }
        if self.track_division {
            if self.division_field.is_empty() {
                return Err(TrackError::config("division_field is empty"));
            }
            if !self.division_score_range.is_valid() {
                return Err(TrackError::config(format!(
                    "invalid division_score_range [{}, {}]",
                    self.division_score_range.min, self.division_score_range.max
                )));
            }
            if self.division_frame_offset == 0 {
                return Err(TrackError::config("division_frame_offset must be at least 1"));
            }
        }
        Ok(())
    }
}

/// One division: `mother` ended, `daughters` start at the division frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DivisionEvent {
    pub mother: TrackId,
    pub daughters: [TrackId; 2],
}

/// Outcome of one [`LapLinker::assign_frame`] step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameSummary {
    pub frame: u32,
    /// Track holding each detection after the step, by detection index.
    pub detection_tracks: Vec<TrackId>,
    /// Existing tracks extended this frame.
    pub linked: Vec<TrackId>,
    /// Tracks started this frame, daughters included.
    pub created: Vec<TrackId>,
    /// Tracks that stopped being active this frame (aged out or divided).
    pub retired: Vec<TrackId>,
    pub divisions: Vec<DivisionEvent>,
}

/// Decisions for one frame, computed before the store is touched.
#[derive(Debug, Default)]
struct FramePlan {
    links: Vec<(TrackId, usize)>,
    unmatched: Vec<TrackId>,
    births: Vec<usize>,
    /// Mother chosen for a birth, by detection index.
    mothers: Vec<(usize, TrackId)>,
}

/// Online linear-assignment tracker with division detection.
#[derive(Debug, Clone)]
pub struct LapLinker {
    config: LinkerConfig,
    tracks: TrackArray,
    solver: Option<Solver>,
}

impl LapLinker {
    pub fn new(config: LinkerConfig) -> Self {
        Self {
            config,
            tracks: TrackArray::new(),
            solver: None,
        }
    }

    /// Create a linker with an explicit solver, overriding `config.solver`.
    pub fn with_solver(config: LinkerConfig, solver: Solver) -> Self {
        Self {
            solver: Some(solver),
            ..Self::new(config)
        }
    }

    pub fn set_solver(&mut self, solver: Solver) {
        self.solver = Some(solver);
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn tracks(&self) -> &TrackArray {
        &self.tracks
    }

    /// Mutable access for corrective edits between frames.
    pub fn tracks_mut(&mut self) -> &mut TrackArray {
        &mut self.tracks
    }

    pub fn into_tracks(self) -> TrackArray {
        self.tracks
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn active_track_ids(&self) -> Vec<TrackId> {
        self.tracks.active_track_ids()
    }

    pub fn get_track(&self, id: TrackId) -> Result<TrackView> {
        self.tracks.get_track(id)
    }

    fn resolve_solver(&self) -> Result<Solver> {
        if let Some(solver) = &self.solver {
            return Ok(solver.clone());
        }
        match (Solver::from_name(&self.config.solver)?, self.config.solver_epsilon) {
            (Solver::LapJv(_), Some(eps)) => Ok(Solver::LapJv(LapJv::with_epsilon(eps))),
            (solver, _) => Ok(solver),
        }
    }

    /// Link `detections` observed at `frame` into the track set.
    ///
    /// Either the whole step is applied or, on error, nothing is.
    pub fn assign_frame(&mut self, frame: u32, detections: &[Detection]) -> Result<FrameSummary> {
        let solver = self.resolve_solver()?;
        self.config.validate()?;

        let detection_values = detections
            .iter()
            .enumerate()
            .map(|(j, det)| {
                det.get(&self.config.link_field)
                    .ok_or_else(|| TrackError::MissingLinkField {
                        field: self.config.link_field.clone(),
                        detection: j,
                    })
            })
            .collect::<Result<Vec<&Value>>>()?;

        let plan = self.plan(frame, &solver, detections, &detection_values)?;
        let summary = self.commit(frame, detections, plan)?;

        log::debug!(
            "frame {frame}: {} linked, {} created, {} retired, {} active",
            summary.linked.len(),
            summary.created.len(),
            summary.retired.len(),
            self.tracks.active_track_ids().len()
        );
        Ok(summary)
    }

    fn plan(
        &self,
        frame: u32,
        solver: &Solver,
        detections: &[Detection],
        detection_values: &[&Value],
    ) -> Result<FramePlan> {
        let mut plan = FramePlan::default();

        // Active tracks with nothing to link by can only age.
        let mut linkable = Vec::new();
        let mut track_values = Vec::new();
        for track in self.tracks.iter().filter(|t| t.is_active()) {
            match track.latest_value(&self.config.link_field) {
                Some(value) => {
                    linkable.push(track.id());
                    track_values.push(value);
                }
                None => plan.unmatched.push(track.id()),
            }
        }

        let matrix = LinkCostMatrix::build(
            &track_values,
            detection_values,
            self.config.link_metric,
            self.config.link_score_range,
        )?;

        let Some(matrix) = matrix else {
            plan.unmatched.extend(linkable);
            plan.births = (0..detections.len()).collect();
            return Ok(plan);
        };

        log::trace!(
            "frame {frame}: {n}x{n} cost matrix, alt cost {:.4}",
            matrix.alt_cost(),
            n = matrix.costs().nrows()
        );
        let assignment = solver.solve(matrix.costs())?;
        log::trace!("frame {frame}: {} total cost {:.4}", solver.name(), assignment.total_cost);

        let mut claimed = vec![false; detections.len()];
        for (row, &id) in linkable.iter().enumerate() {
            match assignment.row_to_col[row] {
                Some(col) if matrix.is_detection_column(col) => {
                    plan.links.push((id, col));
                    claimed[col] = true;
                }
                _ => plan.unmatched.push(id),
            }
        }
        plan.births = (0..detections.len()).filter(|&j| !claimed[j]).collect();

        if self.config.track_division {
            self.plan_divisions(frame, detections, &mut plan)?;
        }
        Ok(plan)
    }

    /// Choose a mother for each birth, if any candidate scores in range.
    ///
    /// A candidate is a track linked this frame that was also recorded in
    /// the previous frame and, if it is a daughter itself, is old enough to
    /// divide again. Its value
    /// `division_frame_offset` frames back is scored against the birth.
    fn plan_divisions(&self, frame: u32, detections: &[Detection], plan: &mut FramePlan) -> Result<()> {
        let field = &self.config.division_field;
        let mut used: Vec<TrackId> = Vec::new();

        for &j in &plan.births {
            let Some(birth_value) = detections[j].get(field) else {
                continue;
            };

            let mut best: Option<(TrackId, f64)> = None;
            for &(id, _) in &plan.links {
                if used.contains(&id) {
                    continue;
                }
                let track = self.tracks.get(id)?;
                let Some(first) = track.first_frame() else {
                    continue;
                };
                // Daughters must start right after the mother's last frame.
                if first >= frame || track.last_frame() != Some(frame - 1) {
                    continue;
                }
                if track.mother_id().is_some() && frame - first < self.config.min_frames_between_div {
                    continue;
                }
                let Some(reference) = track.value_before(field, frame, self.config.division_frame_offset) else {
                    continue;
                };

                let score = self.config.division_metric.score_one(reference, birth_value)?;
                if !self.config.division_score_range.contains(score) {
                    continue;
                }
                if best.is_none_or(|(_, s)| score < s) {
                    best = Some((id, score));
                }
            }

            if let Some((mother, score)) = best {
                log::trace!("frame {frame}: detection {j} divides from track {mother} (score {score:.4})");
                used.push(mother);
                plan.mothers.push((j, mother));
            }
        }
        Ok(())
    }

    fn commit(&mut self, frame: u32, detections: &[Detection], plan: FramePlan) -> Result<FrameSummary> {
        let mut summary = FrameSummary {
            frame,
            detection_tracks: vec![0; detections.len()],
            ..Default::default()
        };

        for &(id, j) in &plan.links {
            self.tracks.update_track(id, frame, &detections[j])?;
            summary.detection_tracks[j] = id;
            summary.linked.push(id);
        }

        for &id in &plan.unmatched {
            let age = self.tracks.get(id)?.age(frame);
            if age.is_none_or(|age| age > self.config.max_track_age) {
                self.tracks.set_state(id, TrackState::AgedOut)?;
                summary.retired.push(id);
                log::debug!("frame {frame}: track {id} aged out");
            }
        }

        for &j in &plan.births {
            let id = self.tracks.add_track(frame, &detections[j]);
            summary.detection_tracks[j] = id;
            summary.created.push(id);

            let Some(&(_, mother)) = plan.mothers.iter().find(|(k, _)| *k == j) else {
                continue;
            };
            let sister = self.tracks.split_track(mother, frame)?;
            self.tracks.set_division(mother, [id, sister])?;
            for owner in summary.detection_tracks.iter_mut().filter(|o| **o == mother) {
                *owner = sister;
            }
            summary.created.push(sister);
            summary.retired.push(mother);
            summary.divisions.push(DivisionEvent {
                mother,
                daughters: [id, sister],
            });
            log::info!("frame {frame}: track {mother} divided into {id} and {sister}");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::attribute::PIXEL_INDICES;
    use crate::tracker::solver::Assignment;

    fn centroid(x: f64, y: f64) -> Detection {
        Detection::new().with(CENTROID, [x, y])
    }

    fn pixels(range: std::ops::RangeInclusive<u64>) -> Detection {
        Detection::new().with(PIXEL_INDICES, Value::indices(range))
    }

    fn overlap_config() -> LinkerConfig {
        LinkerConfig {
            link_field: PIXEL_INDICES.to_string(),
            link_metric: Metric::PxIntersect,
            link_score_range: ScoreRange::new(1.0, 3.5),
            track_division: true,
            division_field: PIXEL_INDICES.to_string(),
            division_metric: Metric::PxIntersect,
            division_score_range: ScoreRange::new(1.0, 3.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_bootstrap_creates_one_track_per_detection() {
        let mut linker = LapLinker::new(LinkerConfig::default());
        let summary = linker
            .assign_frame(1, &[centroid(1.0, 1.0), centroid(10.0, 10.0)])
            .unwrap();
        assert_eq!(summary.created, vec![1, 2]);
        assert_eq!(summary.detection_tracks, vec![1, 2]);
        assert_eq!(linker.num_tracks(), 2);
    }

    #[test]
    fn test_simple_two_point_link() {
        let mut linker = LapLinker::new(LinkerConfig::default());
        linker
            .assign_frame(1, &[centroid(1.0, 1.0), centroid(10.0, 10.0)])
            .unwrap();
        let summary = linker
            .assign_frame(2, &[centroid(1.1, 1.0), centroid(10.0, 10.2)])
            .unwrap();

        assert!(summary.created.is_empty());
        assert_eq!(summary.detection_tracks, vec![1, 2]);
        let t1 = linker.tracks().get(1).unwrap();
        assert_eq!(t1.frames(), &[1, 2]);
        assert_eq!(t1.value(CENTROID, 2), Some(&Value::from([1.1, 1.0])));
        let t2 = linker.tracks().get(2).unwrap();
        assert_eq!(t2.value(CENTROID, 2), Some(&Value::from([10.0, 10.2])));
    }

    #[test]
    fn test_aging_boundary() {
        let config = LinkerConfig {
            max_track_age: 2,
            ..Default::default()
        };
        let mut linker = LapLinker::new(config);
        linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap();

        assert!(linker.assign_frame(2, &[]).unwrap().retired.is_empty());
        assert!(linker.assign_frame(3, &[]).unwrap().retired.is_empty());
        assert_eq!(linker.active_track_ids(), vec![1]);

        let summary = linker.assign_frame(4, &[]).unwrap();
        assert_eq!(summary.retired, vec![1]);
        assert!(linker.active_track_ids().is_empty());
        assert_eq!(linker.tracks().get(1).unwrap().state(), TrackState::AgedOut);
    }

    #[test]
    fn test_out_of_range_detection_starts_new_track() {
        let mut linker = LapLinker::new(LinkerConfig::default());
        linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap();
        let summary = linker.assign_frame(2, &[centroid(500.0, 500.0)]).unwrap();
        assert_eq!(summary.created, vec![2]);
        assert!(summary.linked.is_empty());
        assert!(summary.retired.is_empty());
    }

    #[test]
    fn test_overlap_division() {
        let mut linker = LapLinker::new(overlap_config());
        linker
            .assign_frame(1, &[pixels(1..=10), pixels(100..=110)])
            .unwrap();
        let summary = linker
            .assign_frame(2, &[pixels(1..=5), pixels(6..=9), pixels(100..=110)])
            .unwrap();

        assert_eq!(linker.num_tracks(), 4);
        assert_eq!(summary.divisions.len(), 1);
        let event = summary.divisions[0];
        assert_eq!(event.mother, 1);

        let mother = linker.tracks().get(1).unwrap();
        assert_eq!(mother.state(), TrackState::Divided);
        assert_eq!(mother.frames(), &[1]);
        assert_eq!(mother.daughter_ids(), &event.daughters);

        for d in event.daughters {
            let daughter = linker.tracks().get(d).unwrap();
            assert_eq!(daughter.mother_id(), Some(1));
            assert_eq!(daughter.first_frame(), Some(2));
            assert!(daughter.is_active());
        }

        let unrelated = linker.tracks().get(2).unwrap();
        assert_eq!(unrelated.frames(), &[1, 2]);
        assert!(unrelated.mother_id().is_none());
        assert!(unrelated.is_active());

        // Every detection ends up in exactly one live track.
        assert_eq!(summary.detection_tracks[2], 2);
        assert!(event.daughters.contains(&summary.detection_tracks[0]));
        assert!(event.daughters.contains(&summary.detection_tracks[1]));
    }

    #[test]
    fn test_division_disabled_keeps_mother() {
        let config = LinkerConfig {
            track_division: false,
            ..overlap_config()
        };
        let mut linker = LapLinker::new(config);
        linker.assign_frame(1, &[pixels(1..=10)]).unwrap();
        let summary = linker
            .assign_frame(2, &[pixels(1..=5), pixels(6..=9)])
            .unwrap();
        assert!(summary.divisions.is_empty());
        assert_eq!(linker.num_tracks(), 2);
        assert!(linker.tracks().get(1).unwrap().is_active());
    }

    #[test]
    fn test_young_daughter_cannot_divide() {
        let config = LinkerConfig {
            min_frames_between_div: 5,
            ..overlap_config()
        };
        let mut linker = LapLinker::new(config);
        linker.assign_frame(1, &[pixels(1..=10)]).unwrap();
        let first = linker
            .assign_frame(2, &[pixels(1..=10), pixels(5..=14)])
            .unwrap();
        assert_eq!(first.divisions.len(), 1);
        let daughters = first.divisions[0].daughters;

        // Both daughters are one frame old; a further split is refused.
        let summary = linker
            .assign_frame(3, &[pixels(1..=10), pixels(5..=14), pixels(3..=8)])
            .unwrap();
        assert!(summary.divisions.is_empty());
        for d in daughters {
            assert!(linker.tracks().get(d).unwrap().is_active());
        }
    }

    #[test]
    fn test_daughter_divides_again_once_old_enough() {
        let config = LinkerConfig {
            min_frames_between_div: 2,
            ..overlap_config()
        };
        let mut linker = LapLinker::new(config);
        linker.assign_frame(1, &[pixels(1..=10)]).unwrap();
        let first = linker
            .assign_frame(2, &[pixels(1..=10), pixels(5..=14)])
            .unwrap();
        assert_eq!(first.divisions[0].daughters, [2, 3]);

        let dets = [pixels(1..=10), pixels(5..=14)];
        assert!(linker.assign_frame(3, &dets).unwrap().divisions.is_empty());

        // Daughters started at frame 2, so at frame 4 they are exactly old enough.
        let summary = linker
            .assign_frame(4, &[pixels(1..=10), pixels(5..=14), pixels(3..=8)])
            .unwrap();
        assert_eq!(
            summary.divisions,
            vec![DivisionEvent {
                mother: 3,
                daughters: [4, 5],
            }]
        );
        let mother = linker.tracks().get(3).unwrap();
        assert_eq!(mother.mother_id(), Some(1));
        assert_eq!(mother.frames(), &[2, 3]);
        assert_eq!(mother.state(), TrackState::Divided);
    }

    #[test]
    fn test_no_division_across_a_gap() {
        let mut linker = LapLinker::new(overlap_config());
        linker.assign_frame(1, &[pixels(1..=10)]).unwrap();
        linker.assign_frame(2, &[]).unwrap();
        let summary = linker
            .assign_frame(3, &[pixels(1..=5), pixels(6..=9)])
            .unwrap();

        assert!(summary.divisions.is_empty());
        assert_eq!(summary.linked, vec![1]);
        assert_eq!(summary.created, vec![2]);
        let track = linker.tracks().get(1).unwrap();
        assert_eq!(track.frames(), &[1, 3]);
        assert!(track.mother_id().is_none() && track.daughter_ids().is_empty());
        assert!(linker.tracks().get(2).unwrap().mother_id().is_none());
    }

    #[test]
    fn test_invalid_custom_assignment_fails_before_mutation() {
        let empty = Solver::custom("empty", |_| Ok(Assignment::default()));
        let mut linker = LapLinker::with_solver(LinkerConfig::default(), empty);
        linker.assign_frame(1, &[centroid(0.0, 0.0), centroid(5.0, 0.0)]).unwrap();
        let err = linker
            .assign_frame(2, &[centroid(0.0, 0.0), centroid(5.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TrackError::InvalidAssignment(_)));

        let one_column = Solver::custom("one-column", |costs: ndarray::ArrayView2<'_, f64>| {
            Ok(Assignment {
                row_to_col: vec![Some(0); costs.nrows()],
                total_cost: 0.0,
            })
        });
        linker.set_solver(one_column);
        let err = linker
            .assign_frame(2, &[centroid(0.0, 0.0), centroid(5.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TrackError::InvalidAssignment(_)));

        assert_eq!(linker.num_tracks(), 2);
        for id in [1, 2] {
            assert_eq!(linker.tracks().get(id).unwrap().frames(), &[1]);
        }
    }

    #[test]
    fn test_unknown_solver_fails_before_mutation() {
        let config = LinkerConfig {
            solver: "simplex".to_string(),
            ..Default::default()
        };
        let mut linker = LapLinker::new(config);
        let err = linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap_err();
        assert_eq!(err, TrackError::UnknownSolver("simplex".to_string()));
        assert_eq!(linker.num_tracks(), 0);
    }

    #[test]
    fn test_missing_link_field_is_fatal() {
        let mut linker = LapLinker::new(LinkerConfig::default());
        linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap();
        let err = linker
            .assign_frame(2, &[centroid(0.0, 0.0), Detection::new().with("Area", 3.0)])
            .unwrap_err();
        assert!(matches!(err, TrackError::MissingLinkField { detection: 1, .. }));
        assert_eq!(linker.tracks().get(1).unwrap().frames(), &[1]);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut linker = LapLinker::new(LinkerConfig::default());
        linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap();
        let det = Detection::new().with(CENTROID, [0.0, 0.0, 0.0]);
        assert!(matches!(
            linker.assign_frame(2, &[det]),
            Err(TrackError::DimensionMismatch { .. })
        ));
        assert_eq!(linker.num_tracks(), 1);
    }

    #[test]
    fn test_invalid_config() {
        let config = LinkerConfig {
            link_score_range: ScoreRange::new(5.0, 1.0),
            ..Default::default()
        };
        let mut linker = LapLinker::new(config);
        assert!(matches!(
            linker.assign_frame(1, &[centroid(0.0, 0.0)]),
            Err(TrackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_custom_solver_override() {
        let config = LinkerConfig {
            solver: "does-not-exist".to_string(),
            ..Default::default()
        };
        let mut linker = LapLinker::with_solver(config, Solver::from_name("munkres").unwrap());
        linker.assign_frame(1, &[centroid(0.0, 0.0)]).unwrap();
        let summary = linker.assign_frame(2, &[centroid(0.5, 0.0)]).unwrap();
        assert_eq!(summary.linked, vec![1]);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: LinkerConfig = serde_json::from_str(r#"{"max_track_age": 7, "link_metric": "pxintersect"}"#).unwrap();
        assert_eq!(config.max_track_age, 7);
        assert_eq!(config.link_metric, Metric::PxIntersect);
        assert_eq!(config.solver, "lapjv");
    }
}
