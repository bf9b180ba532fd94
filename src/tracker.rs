mod attribute;
mod cost_matrix;
mod jonker_volgenant;
mod linker;
mod metric;
mod munkres;
mod solver;
mod track_array;
mod track_data;
mod track_state;

pub use attribute::{AREA, CENTROID, Detection, PIXEL_INDICES, Value};
pub use cost_matrix::{ALT_COST_MARGIN, LinkCostMatrix, link_scores};
pub use jonker_volgenant::LapJv;
pub use linker::{DivisionEvent, FrameSummary, LapLinker, LinkerConfig};
pub use metric::{Metric, ScoreRange};
pub use munkres::Munkres;
pub use solver::{Assignment, AssignmentSolver, SolveFn, Solver, validate as validate_costs};
pub use track_array::{TrackArray, Traversal};
pub use track_data::{FieldColumn, TrackData, TrackId, TrackView};
pub use track_state::TrackState;
