//! Jonker-Volgenant shortest augmenting path solver.
//!
//! Dense LAPJV: column reduction, two rounds of augmenting row reduction,
//! then a Dijkstra-like shortest augmenting path search for every row that
//! is still free. Column duals are maintained throughout.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::tracker::solver::{Assignment, AssignmentSolver, SquareProblem, validate};

const NONE: usize = usize::MAX;

/// Jonker-Volgenant solver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LapJv {
    epsilon: Option<f64>,
}

impl LapJv {
    pub fn new() -> Self {
        Self { epsilon: None }
    }

    /// Tolerance used when comparing the two smallest reduced costs during
    /// augmenting row reduction. Defaults to machine epsilon scaled by the
    /// largest cost of the (squared-up) matrix.
    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            epsilon: Some(epsilon.abs()),
        }
    }

    pub fn epsilon(&self) -> Option<f64> {
        self.epsilon
    }
}

impl AssignmentSolver for LapJv {
    fn name(&self) -> &str {
        "lapjv"
    }

    fn solve(&self, costs: ArrayView2<'_, f64>) -> Result<Assignment> {
        validate(costs)?;
        let problem = SquareProblem::new(costs, false)?;
        if problem.size() == 0 {
            return Ok(problem.finish(costs, &[]));
        }

        let eps = self.epsilon.unwrap_or_else(|| {
            let scale = problem.costs.iter().fold(1.0_f64, |m, &c| m.max(c));
            f64::EPSILON * scale
        });

        let x = lapjv_square(&problem.costs, eps);
        log::trace!("lapjv solved {}x{} (eps = {eps:e})", problem.size(), problem.size());
        Ok(problem.finish(costs, &x))
    }
}

/// Solve a square, finite, non-negative problem. Returns row -> column.
pub(crate) fn lapjv_square(cost: &Array2<f64>, eps: f64) -> Vec<usize> {
    let n = cost.nrows();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0];
    }

    let mut x = vec![NONE; n];
    let mut y = vec![NONE; n];
    let mut v = vec![0.0; n];
    let mut free_rows = Vec::with_capacity(n);

    column_reduction(cost, &mut x, &mut y, &mut v, &mut free_rows);

    let mut rounds = 0;
    while !free_rows.is_empty() && rounds < 2 {
        augmenting_row_reduction(cost, &mut free_rows, &mut x, &mut y, &mut v, eps);
        rounds += 1;
    }

    if !free_rows.is_empty() {
        augment(cost, &free_rows, &mut x, &mut y, &mut v);
    }

    x
}

/// Column reduction and reduction transfer. Fills `free_rows` with the rows
/// left unassigned.
fn column_reduction(
    cost: &Array2<f64>,
    x: &mut [usize],
    y: &mut [usize],
    v: &mut [f64],
    free_rows: &mut Vec<usize>,
) {
    let n = cost.nrows();

    for j in 0..n {
        v[j] = f64::INFINITY;
        y[j] = 0;
    }
    for i in 0..n {
        for j in 0..n {
            let c = cost[[i, j]];
            if c < v[j] {
                v[j] = c;
                y[j] = i;
            }
        }
    }

    let mut unique = vec![true; n];
    for j in (0..n).rev() {
        let i = y[j];
        if x[i] == NONE {
            x[i] = j;
        } else {
            unique[i] = false;
            y[j] = NONE;
        }
    }

    free_rows.clear();
    for i in 0..n {
        if x[i] == NONE {
            free_rows.push(i);
        } else if unique[i] {
            let j = x[i];
            let mut min = f64::INFINITY;
            for j2 in (0..n).filter(|&j2| j2 != j) {
                min = min.min(cost[[i, j2]] - v[j2]);
            }
            v[j] -= min;
        }
    }
}

/// One round of augmenting row reduction over `free_rows`; on return
/// `free_rows` holds the rows that are still free.
fn augmenting_row_reduction(
    cost: &Array2<f64>,
    free_rows: &mut Vec<usize>,
    x: &mut [usize],
    y: &mut [usize],
    v: &mut [f64],
    eps: f64,
) {
    let n = cost.nrows();
    let n_free = free_rows.len();
    let mut current = 0;
    let mut new_free = 0;
    let mut rr_count = 0;

    while current < n_free {
        rr_count += 1;
        let free_i = free_rows[current];
        current += 1;

        // Smallest and second smallest reduced cost in the row.
        let mut j1 = 0;
        let mut v1 = cost[[free_i, 0]] - v[0];
        let mut j2 = NONE;
        let mut v2 = f64::INFINITY;
        for j in 1..n {
            let c = cost[[free_i, j]] - v[j];
            if c < v2 {
                if c >= v1 {
                    v2 = c;
                    j2 = j;
                } else {
                    v2 = v1;
                    v1 = c;
                    j2 = j1;
                    j1 = j;
                }
            }
        }

        let mut i0 = y[j1];
        let v1_new = v[j1] - (v2 - v1);
        // Equal minima would leave the dual unchanged and ping-pong the same
        // two rows, so a tie within eps does not count as lowering.
        let v1_lowers = v[j1] - v1_new > eps;

        if rr_count < current * n {
            if v1_lowers {
                v[j1] = v1_new;
            } else if i0 != NONE && j2 != NONE {
                j1 = j2;
                i0 = y[j2];
            }
            if i0 != NONE {
                if v1_lowers {
                    current -= 1;
                    free_rows[current] = i0;
                } else {
                    free_rows[new_free] = i0;
                    new_free += 1;
                }
            }
        } else if i0 != NONE {
            free_rows[new_free] = i0;
            new_free += 1;
        }

        x[free_i] = j1;
        y[j1] = free_i;
    }

    free_rows.truncate(new_free);
}

/// Augment every remaining free row along a shortest alternating path.
fn augment(cost: &Array2<f64>, free_rows: &[usize], x: &mut [usize], y: &mut [usize], v: &mut [f64]) {
    let n = cost.nrows();
    let mut pred = vec![0usize; n];

    for &free_i in free_rows {
        let mut j = find_path(cost, free_i, y, v, &mut pred);
        loop {
            let i = pred[j];
            y[j] = i;
            std::mem::swap(&mut j, &mut x[i]);
            if i == free_i {
                break;
            }
        }
    }
}

/// Shortest augmenting path from `start_i` to a free column. Updates the
/// duals of the columns scanned along the way and returns the free column.
fn find_path(cost: &Array2<f64>, start_i: usize, y: &[usize], v: &mut [f64], pred: &mut [usize]) -> usize {
    let n = cost.nrows();
    let mut cols: Vec<usize> = (0..n).collect();
    let mut d: Vec<f64> = (0..n).map(|j| cost[[start_i, j]] - v[j]).collect();
    pred.iter_mut().for_each(|p| *p = start_i);

    let mut lo = 0;
    let mut hi = 0;
    let mut n_ready = 0;
    let mut final_j = NONE;

    while final_j == NONE {
        if lo == hi {
            n_ready = lo;
            hi = collect_minimum(lo, &d, &mut cols);
            for &j in &cols[lo..hi] {
                if y[j] == NONE {
                    final_j = j;
                }
            }
        }
        if final_j == NONE {
            final_j = scan(cost, &mut lo, &mut hi, &mut d, &mut cols, pred, y, v);
        }
    }

    let mind = d[cols[lo]];
    for &j in &cols[..n_ready] {
        v[j] += d[j] - mind;
    }
    final_j
}

/// Move every column with the minimal distance among `cols[lo..]` into
/// `cols[lo..hi]`. Returns `hi`.
fn collect_minimum(lo: usize, d: &[f64], cols: &mut [usize]) -> usize {
    let n = cols.len();
    let mut hi = lo + 1;
    let mut mind = d[cols[lo]];
    for k in hi..n {
        let j = cols[k];
        if d[j] <= mind {
            if d[j] < mind {
                hi = lo;
                mind = d[j];
            }
            cols[k] = cols[hi];
            cols[hi] = j;
            hi += 1;
        }
    }
    hi
}

/// Scan the columns in `cols[lo..hi]`, relaxing distances of the columns
/// not yet reached. Returns a free column if one is reached at the current
/// minimal distance, leaving `lo`/`hi` untouched; otherwise advances them
/// and returns `NONE`.
#[allow(clippy::too_many_arguments)]
fn scan(
    cost: &Array2<f64>,
    lo: &mut usize,
    hi: &mut usize,
    d: &mut [f64],
    cols: &mut [usize],
    pred: &mut [usize],
    y: &[usize],
    v: &[f64],
) -> usize {
    let n = cols.len();
    let (mut l, mut h_idx) = (*lo, *hi);
    while l != h_idx {
        let j = cols[l];
        l += 1;
        let i = y[j];
        let mind = d[j];
        let h = cost[[i, j]] - v[j] - mind;
        for k in h_idx..n {
            let j = cols[k];
            let cred = cost[[i, j]] - v[j] - h;
            if cred < d[j] {
                d[j] = cred;
                pred[j] = i;
                if cred == mind {
                    if y[j] == NONE {
                        return j;
                    }
                    cols[k] = cols[h_idx];
                    cols[h_idx] = j;
                    h_idx += 1;
                }
            }
        }
    }
    *lo = l;
    *hi = h_idx;
    NONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn brute_force_min(cost: &Array2<f64>) -> f64 {
        fn go(cost: &Array2<f64>, row: usize, used: &mut Vec<bool>) -> f64 {
            let n = cost.nrows();
            if row == n {
                return 0.0;
            }
            let mut best = f64::INFINITY;
            for j in 0..n {
                if !used[j] {
                    used[j] = true;
                    best = best.min(cost[[row, j]] + go(cost, row + 1, used));
                    used[j] = false;
                }
            }
            best
        }
        go(cost, 0, &mut vec![false; cost.nrows()])
    }

    fn total(cost: &Array2<f64>, x: &[usize]) -> f64 {
        x.iter().enumerate().map(|(i, &j)| cost[[i, j]]).sum()
    }

    fn is_permutation(x: &[usize]) -> bool {
        let mut seen = vec![false; x.len()];
        x.iter().all(|&j| j < x.len() && !std::mem::replace(&mut seen[j], true))
    }

    #[test]
    fn test_small_square() {
        let cost = array![[4.0, 1.0, 3.0], [2.0, 0.0, 5.0], [3.0, 2.0, 2.0]];
        let x = lapjv_square(&cost, 1e-12);
        assert!(is_permutation(&x));
        assert_abs_diff_eq!(total(&cost, &x), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_ties() {
        let cost = Array2::from_elem((5, 5), 1.0);
        let x = lapjv_square(&cost, 1e-12);
        assert!(is_permutation(&x));
        assert_abs_diff_eq!(total(&cost, &x), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matches_brute_force() {
        let cost = Array2::from_shape_fn((6, 6), |(i, j)| ((i * 7 + j * 13) % 11) as f64 + 0.5 * ((i + j) % 3) as f64);
        let x = lapjv_square(&cost, f64::EPSILON * 20.0);
        assert!(is_permutation(&x));
        assert_abs_diff_eq!(total(&cost, &x), brute_force_min(&cost), epsilon = 1e-9);
    }

    #[test]
    fn test_rectangular_and_forbidden() {
        let inf = f64::INFINITY;
        let costs = array![[1.0, inf, 3.0], [inf, inf, 2.0]];
        let a = LapJv::new().solve(costs.view()).unwrap();
        assert_eq!(a.row_to_col, vec![Some(0), Some(2)]);
        assert_abs_diff_eq!(a.total_cost, 3.0, epsilon = 1e-12);

        // Both rows want column 2 only; one must stay unassigned.
        let costs = array![[inf, inf, 1.0], [inf, inf, 2.0]];
        let a = LapJv::new().solve(costs.view()).unwrap();
        assert_eq!(a.row_to_col, vec![Some(2), None]);
    }

    #[test]
    fn test_all_infinite_is_unassigned() {
        let costs = Array2::from_elem((2, 3), f64::INFINITY);
        let a = LapJv::new().solve(costs.view()).unwrap();
        assert_eq!(a.row_to_col, vec![None, None]);
        assert_eq!(a.total_cost, 0.0);
    }

    #[test]
    fn test_empty() {
        let costs = Array2::<f64>::zeros((0, 0));
        let a = LapJv::new().solve(costs.view()).unwrap();
        assert!(a.row_to_col.is_empty());
    }

    #[test]
    fn test_explicit_epsilon() {
        let solver = LapJv::with_epsilon(-1e-9);
        assert_eq!(solver.epsilon(), Some(1e-9));
        let cost = array![[1.0, 1.0], [1.0, 1.0]];
        let a = solver.solve(cost.view()).unwrap();
        assert_abs_diff_eq!(a.total_cost, 2.0, epsilon = 1e-12);
    }
}
