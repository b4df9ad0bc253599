//! Error taxonomy for the shallow-water solver.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("runtime concurrency is unsafe for this message-passing substrate: {0}")]
    UnsafeRuntimeConcurrency(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("mesh is inconsistent: {0}")]
    MeshInconsistent(String),

    #[error("unsupported polynomial order {order}: {reason}")]
    UnsupportedOrder { order: i64, reason: String },

    #[error("Newton inversion did not converge after {iterations} iterations (residual {residual:e})")]
    InversionDivergent { iterations: usize, residual: f64 },

    #[error("global trace linear solve diverged: {0}")]
    LinearSolveDivergent(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    #[error("communicator failure: {0}")]
    CommunicatorFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SolverError {
    /// Process exit code a collective abort should surface for this error, per
    /// the CLI contract (`0` success, `1` bad usage/unsafe concurrency, nonzero
    /// abort signal otherwise).
    pub fn exit_code(&self) -> i32 {
        match self {
            SolverError::UnsafeRuntimeConcurrency(_) | SolverError::BadInput(_) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_input_and_unsafe_concurrency_exit_with_one() {
        assert_eq!(SolverError::BadInput("missing mesh".into()).exit_code(), 1);
        assert_eq!(
            SolverError::UnsafeRuntimeConcurrency("single-threaded substrate".into()).exit_code(),
            1
        );
    }

    #[test]
    fn math_errors_exit_nonzero_but_distinct_from_usage() {
        let err = SolverError::NumericalInstability("NaN in ze".into());
        assert_ne!(err.exit_code(), 0);
        assert_ne!(err.exit_code(), 1);
    }
}
