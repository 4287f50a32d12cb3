//! Thin HiGHS backend over `highs-sys`, reduced to loading a column-wise
//! [`Problem`], solving it once and reading the primal solution back.

use crate::error::Error;
use crate::solver::{self, Problem, Sense, Solution, Solver};

use std::convert::TryFrom;
use std::ffi::{c_void, CStr, CString};
use std::fmt::{Debug, Formatter};
use std::num::TryFromIntError;
use std::os::raw::c_char;

use highs_sys::*;
use tracing::warn;

/// The kinds of results of an optimization
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsModelStatus {
    /// not initialized
    NotSet = MODEL_STATUS_NOTSET as isize,
    /// Unable to load model
    LoadError = MODEL_STATUS_LOAD_ERROR as isize,
    /// invalid model
    ModelError = MODEL_STATUS_MODEL_ERROR as isize,
    /// Unable to run the pre-solve phase
    PresolveError = MODEL_STATUS_PRESOLVE_ERROR as isize,
    /// Unable to solve
    SolveError = MODEL_STATUS_SOLVE_ERROR as isize,
    /// Unable to clean after solve
    PostsolveError = MODEL_STATUS_POSTSOLVE_ERROR as isize,
    /// No variables in the model: nothing to optimize
    ModelEmpty = MODEL_STATUS_MODEL_EMPTY as isize,
    /// There is no solution to the problem
    Infeasible = MODEL_STATUS_INFEASIBLE as isize,
    /// The problem in unbounded or infeasible
    UnboundedOrInfeasible = MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE as isize,
    /// The problem is unbounded: there is no single optimal value
    Unbounded = MODEL_STATUS_UNBOUNDED as isize,
    /// An optimal solution was found
    Optimal = MODEL_STATUS_OPTIMAL as isize,
    /// objective bound
    ObjectiveBound = MODEL_STATUS_OBJECTIVE_BOUND as isize,
    /// objective target
    ObjectiveTarget = MODEL_STATUS_OBJECTIVE_TARGET as isize,
    /// reached limit
    ReachedTimeLimit = MODEL_STATUS_REACHED_TIME_LIMIT as isize,
    /// reached limit
    ReachedIterationLimit = MODEL_STATUS_REACHED_ITERATION_LIMIT as isize,
    /// Unknown model status
    Unknown = MODEL_STATUS_UNKNOWN as isize,
}

impl From<HighsModelStatus> for solver::Status {
    fn from(status: HighsModelStatus) -> Self {
        match status {
            HighsModelStatus::Optimal => solver::Status::Optimal,
            HighsModelStatus::Infeasible => solver::Status::Infeasible,
            HighsModelStatus::Unbounded => solver::Status::Unbounded,
            HighsModelStatus::UnboundedOrInfeasible => {
                solver::Status::UnboundedOrInfeasible
            }
            _ => solver::Status::NotSolved,
        }
    }
}

/// This error should never happen: an unexpected status was returned
#[derive(PartialEq, Clone, Copy)]
pub struct InvalidStatus(pub HighsInt);

impl Debug for InvalidStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a valid HiGHS model status", self.0)
    }
}

impl TryFrom<HighsInt> for HighsModelStatus {
    type Error = InvalidStatus;

    fn try_from(value: HighsInt) -> Result<Self, Self::Error> {
        match value {
            MODEL_STATUS_NOTSET => Ok(Self::NotSet),
            MODEL_STATUS_LOAD_ERROR => Ok(Self::LoadError),
            MODEL_STATUS_MODEL_ERROR => Ok(Self::ModelError),
            MODEL_STATUS_PRESOLVE_ERROR => Ok(Self::PresolveError),
            MODEL_STATUS_SOLVE_ERROR => Ok(Self::SolveError),
            MODEL_STATUS_POSTSOLVE_ERROR => Ok(Self::PostsolveError),
            MODEL_STATUS_MODEL_EMPTY => Ok(Self::ModelEmpty),
            MODEL_STATUS_INFEASIBLE => Ok(Self::Infeasible),
            MODEL_STATUS_UNBOUNDED => Ok(Self::Unbounded),
            MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE => {
                Ok(Self::UnboundedOrInfeasible)
            }
            MODEL_STATUS_OPTIMAL => Ok(Self::Optimal),
            MODEL_STATUS_OBJECTIVE_BOUND => Ok(Self::ObjectiveBound),
            MODEL_STATUS_OBJECTIVE_TARGET => Ok(Self::ObjectiveTarget),
            MODEL_STATUS_REACHED_TIME_LIMIT => Ok(Self::ReachedTimeLimit),
            MODEL_STATUS_REACHED_ITERATION_LIMIT => {
                Ok(Self::ReachedIterationLimit)
            }
            MODEL_STATUS_UNKNOWN => Ok(Self::Unknown),
            n => Err(InvalidStatus(n)),
        }
    }
}

/// The status of a highs operation
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsStatus {
    /// Success
    OK = 0,
    /// Done, with warning
    Warning = 1,
    /// An error occurred
    Error = 2,
}

impl From<TryFromIntError> for HighsStatus {
    fn from(_: TryFromIntError) -> Self {
        Self::Error
    }
}

impl TryFrom<HighsInt> for HighsStatus {
    type Error = InvalidStatus;

    fn try_from(value: HighsInt) -> Result<Self, InvalidStatus> {
        match value {
            STATUS_OK => Ok(Self::OK),
            STATUS_WARNING => Ok(Self::Warning),
            STATUS_ERROR => Ok(Self::Error),
            n => Err(InvalidStatus(n)),
        }
    }
}

impl From<HighsStatus> for Error {
    fn from(status: HighsStatus) -> Self {
        Error::Solver(format!("HiGHS returned status {status:?}"))
    }
}

pub trait HighsOptionValue {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt;
}

impl HighsOptionValue for bool {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt {
        highs_sys::Highs_setBoolOptionValue(
            highs,
            option,
            if self { 1 } else { 0 },
        )
    }
}

impl HighsOptionValue for i32 {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt {
        highs_sys::Highs_setIntOptionValue(highs, option, self)
    }
}

impl HighsOptionValue for f64 {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt {
        highs_sys::Highs_setDoubleOptionValue(highs, option, self)
    }
}

impl<'a> HighsOptionValue for &'a CStr {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt {
        highs_sys::Highs_setStringOptionValue(highs, option, self.as_ptr())
    }
}

impl<'a> HighsOptionValue for &'a str {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> HighsInt {
        match CString::new(self) {
            Ok(value) => value.as_c_str().apply_to_highs(highs, option),
            Err(_) => STATUS_ERROR,
        }
    }
}

fn c(n: usize) -> Result<HighsInt, HighsStatus> {
    Ok(n.try_into()?)
}

macro_rules! highs_call {
    ($function_name:ident ($($param:expr),+)) => {
        try_handle_status(
            $function_name($($param),+),
            stringify!($function_name)
        )
    }
}

fn try_handle_status(
    status: HighsInt,
    msg: &str,
) -> Result<HighsStatus, HighsStatus> {
    let status_enum = HighsStatus::try_from(status).map_err(|invalid| {
        warn!("HiGHS returned an unexpected status: {:?}", invalid);
        HighsStatus::Error
    })?;
    match status_enum {
        status @ HighsStatus::OK => Ok(status),
        status @ HighsStatus::Warning => {
            warn!("HiGHS emitted a warning: {}", msg);
            Ok(status)
        }
        error => Err(error),
    }
}

#[derive(Debug)]
struct HighsPtr(*mut c_void);

impl Drop for HighsPtr {
    fn drop(&mut self) {
        unsafe { Highs_destroy(self.0) }
    }
}

impl Default for HighsPtr {
    fn default() -> Self {
        Self(unsafe { Highs_create() })
    }
}

impl HighsPtr {
    // Needed until https://github.com/ERGO-Code/HiGHS/issues/479 is fixed
    unsafe fn unsafe_mut_ptr(&self) -> *mut c_void {
        self.0
    }

    fn mut_ptr(&mut self) -> *mut c_void {
        self.0
    }

    /// Prevents writing anything to the standard output when solving the model
    fn make_quiet(&mut self) -> Result<(), HighsStatus> {
        self.set_option("output_flag", false)?;
        self.set_option("log_to_console", false)
    }

    /// Set a custom parameter on the model
    fn set_option<V: HighsOptionValue>(
        &mut self,
        option: &str,
        value: V,
    ) -> Result<(), HighsStatus> {
        let c_str = CString::new(option).map_err(|_| HighsStatus::Error)?;
        let status =
            unsafe { value.apply_to_highs(self.mut_ptr(), c_str.as_ptr()) };
        try_handle_status(status, "Highs_setOptionValue")?;
        Ok(())
    }

    /// Number of variables
    fn num_cols(&self) -> Result<usize, TryFromIntError> {
        let n = unsafe { Highs_getNumCols(self.0) };
        n.try_into()
    }

    /// Number of constraints
    fn num_rows(&self) -> Result<usize, TryFromIntError> {
        let n = unsafe { Highs_getNumRows(self.0) };
        n.try_into()
    }
}

/// A loaded HiGHS instance, owned by a single solve
#[derive(Debug)]
pub struct Model {
    highs: HighsPtr,
}

impl Model {
    /// Create a Highs model to be optimized (but don't solve it yet).
    /// Returns an error if the problem is incoherent
    pub fn try_new(problem: &Problem) -> Result<Self, HighsStatus> {
        let mut highs = HighsPtr::default();
        highs.make_quiet()?;
        let (astart, aindex, avalue) = problem.to_compressed_matrix_form();
        let astart: Vec<HighsInt> =
            astart.into_iter().map(c).collect::<Result<_, _>>()?;
        let aindex: Vec<HighsInt> =
            aindex.into_iter().map(c).collect::<Result<_, _>>()?;
        unsafe {
            highs_call!(Highs_passLp(
                highs.mut_ptr(),
                c(problem.num_col)?,
                c(problem.num_row)?,
                c(problem.num_nz)?,
                MATRIX_FORMAT_COLUMN_WISE,
                OBJECTIVE_SENSE_MINIMIZE,
                problem.offset,
                problem.col_cost.as_ptr(),
                problem.col_lower.as_ptr(),
                problem.col_upper.as_ptr(),
                problem.row_lower.as_ptr(),
                problem.row_upper.as_ptr(),
                astart.as_ptr(),
                aindex.as_ptr(),
                avalue.as_ptr()
            ))
        }?;
        Ok(Self { highs })
    }

    /// Set the optimization sense (minimize by default)
    pub fn set_sense(&mut self, sense: Sense) -> Result<(), HighsStatus> {
        let sense = match sense {
            Sense::Maximise => OBJECTIVE_SENSE_MAXIMIZE,
            Sense::Minimise => OBJECTIVE_SENSE_MINIMIZE,
        };
        unsafe {
            highs_call!(Highs_changeObjectiveSense(self.highs.mut_ptr(), sense))
        }?;
        Ok(())
    }

    pub fn set_option<V: HighsOptionValue>(
        &mut self,
        option: &str,
        value: V,
    ) -> Result<(), HighsStatus> {
        self.highs.set_option(option, value)
    }

    /// Find the optimal value for the problem, return an error if the problem is incoherent
    pub fn try_solve(&mut self) -> Result<(), HighsStatus> {
        unsafe { highs_call!(Highs_run(self.highs.mut_ptr())) }?;
        Ok(())
    }

    /// The status of the solution. Should be Optimal if everything went well.
    pub fn status(&self) -> Result<HighsModelStatus, HighsStatus> {
        let model_status =
            unsafe { Highs_getModelStatus(self.highs.unsafe_mut_ptr()) };
        HighsModelStatus::try_from(model_status).map_err(|_| HighsStatus::Error)
    }

    /// Primal values of every column and row
    pub fn get_primal_values(
        &self,
    ) -> Result<(Vec<f64>, Vec<f64>), HighsStatus> {
        let cols = self.highs.num_cols()?;
        let rows = self.highs.num_rows()?;
        let mut colvalue: Vec<f64> = vec![0.; cols];
        let mut coldual: Vec<f64> = vec![0.; cols];
        let mut rowvalue: Vec<f64> = vec![0.; rows];
        let mut rowdual: Vec<f64> = vec![0.; rows];

        unsafe {
            highs_call!(Highs_getSolution(
                self.highs.unsafe_mut_ptr(),
                colvalue.as_mut_ptr(),
                coldual.as_mut_ptr(),
                rowvalue.as_mut_ptr(),
                rowdual.as_mut_ptr()
            ))
        }?;

        Ok((colvalue, rowvalue))
    }

    pub fn get_objective_value(&self) -> f64 {
        unsafe { Highs_getObjectiveValue(self.highs.unsafe_mut_ptr()) }
    }
}

/// Options applied to every model before solving
#[derive(Debug, Clone, PartialEq)]
pub struct HighsOptions {
    pub presolve: bool,
    pub primal_feasibility_tolerance: f64,
    pub dual_feasibility_tolerance: f64,
    pub time_limit: f64,
}

impl Default for HighsOptions {
    fn default() -> Self {
        Self {
            presolve: false,
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            time_limit: 300.0,
        }
    }
}

/// [`Solver`] backed by the HiGHS dual simplex. Each call builds its own
/// HiGHS instance, so a single value can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct HighsSolver {
    pub options: HighsOptions,
}

impl HighsSolver {
    pub fn new(options: HighsOptions) -> Self {
        Self { options }
    }

    fn set_solver_options(&self, model: &mut Model) -> Result<(), HighsStatus> {
        model.set_option(
            "presolve",
            if self.options.presolve { "on" } else { "off" },
        )?;
        model.set_option("solver", "simplex")?;
        model.set_option("parallel", "off")?;
        model.set_option("threads", 1)?;
        model.set_option(
            "primal_feasibility_tolerance",
            self.options.primal_feasibility_tolerance,
        )?;
        model.set_option(
            "dual_feasibility_tolerance",
            self.options.dual_feasibility_tolerance,
        )?;
        model.set_option("time_limit", self.options.time_limit)
    }
}

fn zero_is_feasible(problem: &Problem) -> bool {
    problem
        .row_lower
        .iter()
        .zip(problem.row_upper.iter())
        .all(|(low, high)| *low <= 0.0 && 0.0 <= *high)
}

impl Solver for HighsSolver {
    fn solve(&self, problem: &Problem, sense: Sense) -> Result<Solution, Error> {
        let mut model = Model::try_new(problem)?;
        model.set_sense(sense)?;
        self.set_solver_options(&mut model)?;
        model.try_solve()?;

        let status = match model.status()? {
            // HiGHS skips the rows of a model without columns, so the
            // zero point has to be checked against them here
            HighsModelStatus::ModelEmpty if zero_is_feasible(problem) => {
                solver::Status::Optimal
            }
            HighsModelStatus::ModelEmpty => solver::Status::Infeasible,
            other => other.into(),
        };
        match status {
            solver::Status::Optimal => {
                let (colvalue, rowvalue) = model.get_primal_values()?;
                Ok(Solution {
                    status,
                    objective: model.get_objective_value(),
                    colvalue,
                    rowvalue,
                })
            }
            _ => Ok(Solution {
                status,
                objective: f64::NAN,
                colvalue: vec![],
                rowvalue: vec![],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_small_lp() {
        // min x + 2y  s.t.  x + y = 10, x <= 4
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..4.0);
        let y = pb.add_column(2.0, 0.0..);
        pb.add_row(10.0..10.0, &[(x, 1.0), (y, 1.0)]);

        let solution = HighsSolver::default()
            .solve(&pb, Sense::Minimise)
            .unwrap();
        assert!(solution.is_optimal());
        assert!((solution.colvalue[x] - 4.0).abs() < 1e-6);
        assert!((solution.colvalue[y] - 6.0).abs() < 1e-6);
        assert!((solution.objective - 16.0).abs() < 1e-6);
        assert!((solution.rowvalue[0] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_maximise() {
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..3.0);
        pb.add_row(..2.0, &[(x, 1.0)]);
        let solution = HighsSolver::default()
            .solve(&pb, Sense::Maximise)
            .unwrap();
        assert!(solution.is_optimal());
        assert!((solution.objective - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_lp_is_reported() {
        let mut pb = Problem::new();
        let x = pb.add_column(1.0, 0.0..1.0);
        pb.add_row(5.0..5.0, &[(x, 1.0)]);
        let solution = HighsSolver::default()
            .solve(&pb, Sense::Minimise)
            .unwrap();
        assert!(!solution.is_optimal());
        assert!(solution.colvalue.is_empty());
    }

    #[test]
    fn test_empty_model_checks_rows_at_zero() {
        let mut pb = Problem::new();
        pb.add_row(40.0..40.0, std::iter::empty::<(usize, f64)>());
        let solution = HighsSolver::default()
            .solve(&pb, Sense::Minimise)
            .unwrap();
        assert_eq!(solution.status, solver::Status::Infeasible);
        assert!(solution.colvalue.is_empty());

        let mut pb = Problem::new();
        pb.add_row(0.0..0.0, std::iter::empty::<(usize, f64)>());
        pb.add_row(..5.0, std::iter::empty::<(usize, f64)>());
        let solution = HighsSolver::default()
            .solve(&pb, Sense::Minimise)
            .unwrap();
        assert!(solution.is_optimal());
        assert!(solution.colvalue.is_empty());
    }

    #[test]
    fn test_model_status_conversion() {
        assert_eq!(
            solver::Status::from(HighsModelStatus::Optimal),
            solver::Status::Optimal
        );
        assert_eq!(
            solver::Status::from(HighsModelStatus::Infeasible),
            solver::Status::Infeasible
        );
        assert_eq!(
            solver::Status::from(HighsModelStatus::ReachedTimeLimit),
            solver::Status::NotSolved
        );
        assert_eq!(
            solver::Status::from(HighsModelStatus::ModelEmpty),
            solver::Status::NotSolved
        );
    }
}
