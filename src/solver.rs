//! Engine-agnostic linear programs and the contract any optimization
//! engine must satisfy to dispatch them.

use crate::error::Error;
use std::borrow::Borrow;
use std::fmt;
use std::ops::{Bound, RangeBounds};

fn bound_value<N: Into<f64> + Copy>(b: Bound<&N>) -> Option<f64> {
    match b {
        Bound::Included(v) | Bound::Excluded(v) => Some((*v).into()),
        Bound::Unbounded => None,
    }
}

/// Whether to maximize or minimize the objective function
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Sense {
    Maximise,
    Minimise,
}

/// A linear program stored column-wise, as most simplex engines expect it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Problem {
    pub num_col: usize,
    pub num_row: usize,
    pub num_nz: usize,
    pub col_cost: Vec<f64>,
    pub col_lower: Vec<f64>,
    pub col_upper: Vec<f64>,
    pub row_lower: Vec<f64>,
    pub row_upper: Vec<f64>,
    pub offset: f64,
    columns: Vec<(Vec<usize>, Vec<f64>)>,
}

impl Problem {
    /// Create a new problem instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable with objective coefficient `col_factor` and the
    /// given bounds, returning its index.
    pub fn add_column<N: Into<f64> + Copy, B: RangeBounds<N>>(
        &mut self,
        col_factor: f64,
        bounds: B,
    ) -> usize {
        self.col_cost.push(col_factor);
        let low =
            bound_value(bounds.start_bound()).unwrap_or(f64::NEG_INFINITY);
        let high = bound_value(bounds.end_bound()).unwrap_or(f64::INFINITY);
        self.col_lower.push(low);
        self.col_upper.push(high);
        self.columns.push((vec![], vec![]));
        let old_col_count = self.num_col;
        self.num_col += 1;
        old_col_count
    }

    /// Adds a constraint `bounds` over the sum of `(column, factor)` terms,
    /// returning its index. Repeated columns are merged into one entry.
    pub fn add_row<
        N: Into<f64> + Copy,
        B: RangeBounds<N>,
        ITEM: Borrow<(usize, f64)>,
        I: IntoIterator<Item = ITEM>,
    >(
        &mut self,
        bounds: B,
        row_factors: I,
    ) -> usize {
        let row = self.num_row;
        for r in row_factors {
            let &(col, factor) = r.borrow();
            let c = &mut self.columns[col];
            match c.0.last() {
                Some(&last) if last == row => {
                    if let Some(v) = c.1.last_mut() {
                        *v += factor;
                    }
                }
                _ => {
                    c.0.push(row);
                    c.1.push(factor);
                    self.num_nz += 1;
                }
            }
        }
        let low =
            bound_value(bounds.start_bound()).unwrap_or(f64::NEG_INFINITY);
        let high = bound_value(bounds.end_bound()).unwrap_or(f64::INFINITY);
        self.row_lower.push(low);
        self.row_upper.push(high);
        self.num_row += 1;
        row
    }

    /// The (row, factor) entries of a column
    pub fn column(&self, col: usize) -> (&[usize], &[f64]) {
        let (rows, factors) = &self.columns[col];
        (rows, factors)
    }

    /// Compressed sparse column form: (start, index, value)
    pub fn to_compressed_matrix_form(
        &self,
    ) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let mut astart = Vec::with_capacity(self.num_col + 1);
        astart.push(0);
        let mut aindex = Vec::with_capacity(self.num_nz);
        let mut avalue = Vec::with_capacity(self.num_nz);
        for (row_indices, factors) in self.columns.iter() {
            aindex.extend_from_slice(row_indices);
            avalue.extend_from_slice(factors);
            astart.push(aindex.len());
        }
        (astart, aindex, avalue)
    }

    /// Evaluates every constraint row at the point `colvalue`
    pub fn row_activities(&self, colvalue: &[f64]) -> Vec<f64> {
        assert_eq!(colvalue.len(), self.num_col);
        let mut activities = vec![0.0; self.num_row];
        for (col, (rows, factors)) in self.columns.iter().enumerate() {
            for (row, factor) in rows.iter().zip(factors.iter()) {
                activities[*row] += factor * colvalue[col];
            }
        }
        activities
    }
}

/// Outcome of a solve, independent of the engine that produced it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    UnboundedOrInfeasible,
    /// Stopped for any other reason (limits, numerical trouble)
    NotSolved,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Optimal => "Optimal",
            Status::Infeasible => "Infeasible",
            Status::Unbounded => "Unbounded",
            Status::UnboundedOrInfeasible => "UnboundedOrInfeasible",
            Status::NotSolved => "NotSolved",
        };
        f.write_str(s)
    }
}

/// Concrete values of the solution. `colvalue` and `rowvalue` are only
/// meaningful when `status` is [`Status::Optimal`].
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub status: Status,
    pub objective: f64,
    pub colvalue: Vec<f64>,
    pub rowvalue: Vec<f64>,
}

impl Solution {
    pub fn is_optimal(&self) -> bool {
        self.status == Status::Optimal
    }
}

/// Any engine able to solve a [`Problem`] to optimality or report why not
pub trait Solver: Send + Sync {
    fn solve(&self, problem: &Problem, sense: Sense) -> Result<Solution, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_columns_and_rows() {
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..10.0);
        let y = pb.add_column(0.0, 0.0..);
        let r = pb.add_row(5.0..5.0, &[(x, 1.0), (y, -1.0)]);
        assert_eq!((x, y, r), (0, 1, 0));
        assert_eq!(pb.num_nz, 2);
        assert_eq!(pb.col_upper, vec![10.0, f64::INFINITY]);
        assert_eq!(pb.row_lower, vec![5.0]);
        assert_eq!(pb.row_upper, vec![5.0]);
    }

    #[test]
    fn test_repeated_column_in_row_is_merged() {
        let mut pb = Problem::new();
        let x = pb.add_column(0.0, 0.0..1.0);
        pb.add_row(0.0..0.0, &[(x, -1.0), (x, 0.75)]);
        assert_eq!(pb.num_nz, 1);
        let (rows, factors) = pb.column(x);
        assert_eq!(rows, &[0]);
        assert_eq!(factors, &[-0.25]);
    }

    #[test]
    fn test_compressed_matrix_form() {
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..);
        let y = pb.add_column(1.0, 0.0..);
        pb.add_row(..1.0, &[(x, 1.0)]);
        pb.add_row(..2.0, &[(x, 2.0), (y, 3.0)]);
        let (astart, aindex, avalue) = pb.to_compressed_matrix_form();
        assert_eq!(astart, vec![0, 2, 3]);
        assert_eq!(aindex, vec![0, 1, 1]);
        assert_eq!(avalue, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_row_activities() {
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..);
        let y = pb.add_column(1.0, 0.0..);
        pb.add_row(0.0..0.0, &[(x, 1.0), (y, -0.5)]);
        pb.add_row(0.0..0.0, &[(y, 2.0)]);
        assert_eq!(pb.row_activities(&[4.0, 2.0]), vec![3.0, 4.0]);
    }
}
