//! Linear assignment solvers behind a common contract.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TrackError};
use crate::tracker::jonker_volgenant::LapJv;
use crate::tracker::munkres::Munkres;

/// Minimum-cost one-to-one assignment of rows to columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignment {
    /// Assigned column per row; `None` marks an unassigned row.
    pub row_to_col: Vec<Option<usize>>,
    /// Sum of the assigned (finite) costs.
    pub total_cost: f64,
}

impl Assignment {
    /// `(row, col)` pairs of all assigned rows.
    pub fn matches(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.row_to_col
            .iter()
            .enumerate()
            .filter_map(|(row, col)| col.map(|c| (row, c)))
    }

    pub fn unassigned_rows(&self) -> Vec<usize> {
        self.row_to_col
            .iter()
            .enumerate()
            .filter_map(|(row, col)| if col.is_none() { Some(row) } else { None })
            .collect()
    }

    /// Check the assignment against `costs`: one entry per row, every
    /// column in range, used at most once and at a finite cost.
    pub fn check(&self, costs: ArrayView2<'_, f64>) -> Result<()> {
        let (n_rows, n_cols) = costs.dim();
        if self.row_to_col.len() != n_rows {
            return Err(TrackError::assignment(format!(
                "{} rows assigned, cost matrix has {n_rows}",
                self.row_to_col.len()
            )));
        }
        let mut taken = vec![false; n_cols];
        for (row, col) in self.matches() {
            if col >= n_cols {
                return Err(TrackError::assignment(format!(
                    "row {row} assigned to column {col} of {n_cols}"
                )));
            }
            if std::mem::replace(&mut taken[col], true) {
                return Err(TrackError::assignment(format!("column {col} assigned twice")));
            }
            if !costs[[row, col]].is_finite() {
                return Err(TrackError::assignment(format!(
                    "row {row} assigned to forbidden column {col}"
                )));
            }
        }
        Ok(())
    }

    /// Inverse mapping over `n_cols` columns.
    pub fn col_to_row(&self, n_cols: usize) -> Vec<Option<usize>> {
        let mut inverse = vec![None; n_cols];
        for (row, col) in self.matches() {
            if col < n_cols {
                inverse[col] = Some(row);
            }
        }
        inverse
    }
}

/// Contract shared by all assignment solvers.
///
/// Entries are costs in `[0, inf]`; infinity forbids a pairing. Rectangular
/// matrices are accepted. Every row of the result is either assigned to a
/// column with a finite cost or explicitly unassigned.
pub trait AssignmentSolver {
    fn name(&self) -> &str;

    fn solve(&self, costs: ArrayView2<'_, f64>) -> Result<Assignment>;
}

/// Function signature accepted by [`Solver::custom`].
pub type SolveFn = Arc<dyn Fn(ArrayView2<'_, f64>) -> Result<Assignment> + Send + Sync>;

/// Solver selection: the two built-in solvers or a user-supplied function.
#[derive(Clone)]
pub enum Solver {
    LapJv(LapJv),
    Munkres(Munkres),
    Custom { name: String, solve: SolveFn },
}

impl Solver {
    /// Resolve a solver by name (`"lapjv"` or `"munkres"`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lapjv" | "jv" => Ok(Solver::LapJv(LapJv::new())),
            "munkres" | "hungarian" => Ok(Solver::Munkres(Munkres::new())),
            _ => Err(TrackError::UnknownSolver(name.to_string())),
        }
    }

    pub fn custom<F>(name: impl Into<String>, solve: F) -> Self
    where
        F: Fn(ArrayView2<'_, f64>) -> Result<Assignment> + Send + Sync + 'static,
    {
        Solver::Custom {
            name: name.into(),
            solve: Arc::new(solve),
        }
    }
}

impl Default for Solver {
    fn default() -> Self {
        Solver::LapJv(LapJv::new())
    }
}

impl FromStr for Solver {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Solver::LapJv(jv) => f.debug_tuple("LapJv").field(jv).finish(),
            Solver::Munkres(m) => f.debug_tuple("Munkres").field(m).finish(),
            Solver::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl AssignmentSolver for Solver {
    fn name(&self) -> &str {
        match self {
            Solver::LapJv(jv) => jv.name(),
            Solver::Munkres(m) => m.name(),
            Solver::Custom { name, .. } => name,
        }
    }

    fn solve(&self, costs: ArrayView2<'_, f64>) -> Result<Assignment> {
        match self {
            Solver::LapJv(jv) => jv.solve(costs),
            Solver::Munkres(m) => m.solve(costs),
            Solver::Custom { solve, .. } => {
                validate(costs)?;
                let assignment = (solve.as_ref())(costs)?;
                assignment.check(costs)?;
                Ok(assignment)
            }
        }
    }
}

/// Reject matrices containing NaN or negative entries.
pub fn validate(costs: ArrayView2<'_, f64>) -> Result<()> {
    for ((i, j), &c) in costs.indexed_iter() {
        if c.is_nan() {
            return Err(TrackError::cost_matrix(format!("NaN at ({i}, {j})")));
        }
        if c < 0.0 {
            return Err(TrackError::cost_matrix(format!("negative cost {c} at ({i}, {j})")));
        }
    }
    Ok(())
}

/// Square, finite version of a cost matrix.
///
/// Forbidden cells carry a sentinel cost larger than any complete finite
/// assignment, so an optimal square solution first maximizes the number of
/// finite pairings and then minimizes their cost. Padding rows/columns cost
/// zero.
#[derive(Debug, Clone)]
pub(crate) struct SquareProblem {
    pub costs: Array2<f64>,
    /// Original row behind each square row (`None` for padding).
    pub rows: Vec<Option<usize>>,
    /// Original column behind each square column (`None` for padding).
    pub cols: Vec<Option<usize>>,
}

impl SquareProblem {
    /// Build the square problem. With `exclude_infeasible`, rows and columns
    /// that are entirely infinite are dropped up front; they can only ever
    /// be unassigned.
    pub fn new(costs: ArrayView2<'_, f64>, exclude_infeasible: bool) -> Result<Self> {
        let (n_rows, n_cols) = costs.dim();

        let kept_rows: Vec<usize> = (0..n_rows)
            .filter(|&i| !exclude_infeasible || costs.row(i).iter().any(|c| c.is_finite()))
            .collect();
        let kept_cols: Vec<usize> = (0..n_cols)
            .filter(|&j| !exclude_infeasible || costs.column(j).iter().any(|c| c.is_finite()))
            .collect();

        let n = kept_rows.len().max(kept_cols.len());

        let mut max_finite: f64 = 0.0;
        for &i in &kept_rows {
            for &j in &kept_cols {
                let c = costs[[i, j]];
                if c.is_finite() {
                    max_finite = max_finite.max(c);
                }
            }
        }
        let forbidden = max_finite * (n as f64 + 1.0) + 1.0;
        if !forbidden.is_finite() {
            return Err(TrackError::cost_matrix("finite costs are too large to pad"));
        }

        let mut square = Array2::zeros((n, n));
        for (si, &i) in kept_rows.iter().enumerate() {
            for (sj, &j) in kept_cols.iter().enumerate() {
                let c = costs[[i, j]];
                square[[si, sj]] = if c.is_finite() { c } else { forbidden };
            }
        }

        let mut rows: Vec<Option<usize>> = kept_rows.into_iter().map(Some).collect();
        rows.resize(n, None);
        let mut cols: Vec<Option<usize>> = kept_cols.into_iter().map(Some).collect();
        cols.resize(n, None);

        Ok(Self {
            costs: square,
            rows,
            cols,
        })
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Map a square row->column solution back onto the original matrix.
    pub fn finish(&self, original: ArrayView2<'_, f64>, square_row_to_col: &[usize]) -> Assignment {
        let mut row_to_col = vec![None; original.nrows()];
        let mut total_cost = 0.0;
        for (si, &sj) in square_row_to_col.iter().enumerate() {
            if let (Some(i), Some(j)) = (self.rows[si], self.cols[sj]) {
                let c = original[[i, j]];
                if c.is_finite() {
                    row_to_col[i] = Some(j);
                    total_cost += c;
                }
            }
        }
        Assignment {
            row_to_col,
            total_cost,
        }
    }
}
