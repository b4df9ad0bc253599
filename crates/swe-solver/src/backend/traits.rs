//! Backend trait definitions for the global trace linear solve.
//!
//! A COO-triplet interchange format and a `Send + Sync` solver trait,
//! narrowed to just `LinearSolver` since the trace system has no
//! eigenvalue problem.

use nalgebra::DVector;

#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Sparse matrix in COO (coordinate/triplet) format: the backend-agnostic
/// interchange between trace assembly and any solver backend.
pub struct SparseTripletsF64 {
    pub nrows: usize,
    pub ncols: usize,
    pub row_indices: Vec<usize>,
    pub col_indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseTripletsF64 {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// The assembled global trace system `delta_hat_global * x = rhs_hat`,
/// ready for a backend to solve.
pub struct LinearSystemData {
    pub matrix: SparseTripletsF64,
    pub rhs: DVector<f64>,
    pub num_dofs: usize,
}

/// Solver convergence and diagnostic info, reported up to the driver for
/// logging and for the `tol_abs`/`tol_rel` convergence check.
pub struct SolveInfo {
    pub iterations: usize,
    pub residual_norm: Option<f64>,
    pub solver_name: String,
}

/// A pluggable linear-solver backend for the global trace system.
///
/// `NativeBackend` (nalgebra + nalgebra-lapack) is the only backend
/// implemented here; an external PETSc-backed implementation could
/// satisfy this same trait.
pub trait LinearSolver: Send + Sync {
    fn solve_linear(&self, system: &LinearSystemData) -> Result<(DVector<f64>, SolveInfo), BackendError>;
}

pub trait SolverBackend: LinearSolver {
    fn name(&self) -> &str;
}

/// Standard relative/absolute convergence criterion:
/// `||r||_2 <= tol_abs + tol_rel * ||r0||_2`.
pub fn has_converged(residual_norm: f64, initial_residual_norm: f64, tol_abs: f64, tol_rel: f64) -> bool {
    residual_norm <= tol_abs + tol_rel * initial_residual_norm
}
