//! Munkres (Hungarian) solver using the starred/primed zero cover method.

use ndarray::{Array2, ArrayView2};

use crate::error::Result;
use crate::tracker::solver::{Assignment, AssignmentSolver, SquareProblem, validate};

/// Munkres solver. Slower than [`LapJv`](crate::tracker::LapJv) on the
/// mostly-forbidden matrices the linker builds, kept as a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Munkres;

impl Munkres {
    pub fn new() -> Self {
        Self
    }
}

impl AssignmentSolver for Munkres {
    fn name(&self) -> &str {
        "munkres"
    }

    fn solve(&self, costs: ArrayView2<'_, f64>) -> Result<Assignment> {
        validate(costs)?;
        // Entirely forbidden rows/columns never take part in the cover search.
        let mut problem = SquareProblem::new(costs, true)?;
        if problem.size() == 0 {
            return Ok(problem.finish(costs, &[]));
        }
        let x = munkres_square(&mut problem.costs);
        log::trace!("munkres solved {}x{}", x.len(), x.len());
        Ok(problem.finish(costs, &x))
    }
}

/// Cover state of the zero-cover search.
struct Cover {
    star_in_row: Vec<Option<usize>>,
    star_in_col: Vec<Option<usize>>,
    prime_in_row: Vec<Option<usize>>,
    row_covered: Vec<bool>,
    col_covered: Vec<bool>,
}

impl Cover {
    fn new(n: usize) -> Self {
        Self {
            star_in_row: vec![None; n],
            star_in_col: vec![None; n],
            prime_in_row: vec![None; n],
            row_covered: vec![false; n],
            col_covered: vec![false; n],
        }
    }

    fn star(&mut self, row: usize, col: usize) {
        self.star_in_row[row] = Some(col);
        self.star_in_col[col] = Some(row);
    }

    fn clear_primes_and_covers(&mut self) {
        self.prime_in_row.iter_mut().for_each(|p| *p = None);
        self.row_covered.iter_mut().for_each(|c| *c = false);
        self.col_covered.iter_mut().for_each(|c| *c = false);
    }

    /// Cover every column holding a starred zero; returns how many.
    fn cover_starred_columns(&mut self) -> usize {
        let mut count = 0;
        for (covered, star) in self.col_covered.iter_mut().zip(&self.star_in_col) {
            *covered = star.is_some();
            count += usize::from(*covered);
        }
        count
    }
}

/// Solve a square, finite, non-negative problem in place. Returns row -> column.
pub(crate) fn munkres_square(c: &mut Array2<f64>) -> Vec<usize> {
    let n = c.nrows();

    // Row then column reduction.
    for mut row in c.rows_mut() {
        let min = row.iter().cloned().fold(f64::INFINITY, f64::min);
        row.mapv_inplace(|x| x - min);
    }
    for mut col in c.columns_mut() {
        let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
        col.mapv_inplace(|x| x - min);
    }

    let mut cover = Cover::new(n);
    for i in 0..n {
        for j in 0..n {
            if is_zero(c[[i, j]]) && cover.star_in_row[i].is_none() && cover.star_in_col[j].is_none() {
                cover.star(i, j);
            }
        }
    }

    while cover.cover_starred_columns() < n {
        // Prime uncovered zeros until one has no star in its row.
        let (row, col) = loop {
            match find_uncovered_zero(c, &cover) {
                Some((i, j)) => {
                    cover.prime_in_row[i] = Some(j);
                    match cover.star_in_row[i] {
                        Some(star_col) => {
                            cover.row_covered[i] = true;
                            cover.col_covered[star_col] = false;
                        }
                        None => break (i, j),
                    }
                }
                None => adjust(c, &cover),
            }
        };
        augment_path(&mut cover, row, col);
        cover.clear_primes_and_covers();
    }

    cover
        .star_in_row
        .iter()
        .map(|s| s.unwrap_or_default())
        .collect()
}

#[inline]
fn is_zero(x: f64) -> bool {
    x <= 0.0
}

fn find_uncovered_zero(c: &Array2<f64>, cover: &Cover) -> Option<(usize, usize)> {
    let n = c.nrows();
    for i in (0..n).filter(|&i| !cover.row_covered[i]) {
        for j in (0..n).filter(|&j| !cover.col_covered[j]) {
            if is_zero(c[[i, j]]) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Add the smallest uncovered value to every covered row and subtract it
/// from every uncovered column.
fn adjust(c: &mut Array2<f64>, cover: &Cover) {
    let n = c.nrows();
    let mut min = f64::INFINITY;
    for i in (0..n).filter(|&i| !cover.row_covered[i]) {
        for j in (0..n).filter(|&j| !cover.col_covered[j]) {
            min = min.min(c[[i, j]]);
        }
    }
    for i in 0..n {
        for j in 0..n {
            if cover.row_covered[i] {
                c[[i, j]] += min;
            }
            if !cover.col_covered[j] {
                c[[i, j]] -= min;
            }
        }
    }
}

/// Alternate primes and stars starting from the uncovered primed zero at
/// `(row, col)`: stars along the path are removed, primes become stars.
fn augment_path(cover: &mut Cover, row: usize, col: usize) {
    let mut primes = vec![(row, col)];
    let mut stars = Vec::new();
    let mut col = col;
    while let Some(star_row) = cover.star_in_col[col] {
        stars.push((star_row, col));
        // A starred row on the path always carries a prime.
        let Some(prime_col) = cover.prime_in_row[star_row] else {
            break;
        };
        primes.push((star_row, prime_col));
        col = prime_col;
    }

    for (i, j) in stars {
        cover.star_in_row[i] = None;
        cover.star_in_col[j] = None;
    }
    for (i, j) in primes {
        cover.star(i, j);
    }
}
