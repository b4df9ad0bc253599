//! Skeleton (trace/edge) data.
//!
//! One `EdgeData` lives inside every `Interface`/`Boundary`/
//! `DistributedBoundary`, holding the hybrid unknown and the matrices the
//! global edge kernel assembles into.

use nalgebra::{DMatrix, DVector};

use crate::element::N_VARIABLES;

#[derive(Debug, Clone)]
pub struct EdgeData {
    /// Modal coefficients of the hybrid trace unknown `q_hat`, shape
    /// `(N_VARIABLES, ndof_trace)`.
    pub q_hat: DMatrix<f64>,
    pub q_hat_at_gp: DMatrix<f64>,
    pub aux_hat_at_gp: DMatrix<f64>,
    /// Snapshot of `q_hat_at_gp` taken at initialization, used by kernels
    /// that need the original (t=0) trace state.
    pub q_init_at_gp: DMatrix<f64>,
    /// Local Jacobian contribution to the global trace system, shape
    /// `(N_VARIABLES * ndof_trace, N_VARIABLES * ndof_trace)`.
    pub delta_hat_global_kernel_at_gp: DMatrix<f64>,
    /// Local residual contribution, shape `(N_VARIABLES * ndof_trace,)`.
    pub rhs_global_kernel_at_gp: DVector<f64>,
}

impl EdgeData {
    pub fn zeros(ndof_trace: usize, ngp: usize) -> Self {
        let n = N_VARIABLES * ndof_trace;
        EdgeData {
            q_hat: DMatrix::zeros(N_VARIABLES, ndof_trace),
            q_hat_at_gp: DMatrix::zeros(N_VARIABLES, ngp),
            aux_hat_at_gp: DMatrix::zeros(crate::element::N_AUX, ngp),
            q_init_at_gp: DMatrix::zeros(N_VARIABLES, ngp),
            delta_hat_global_kernel_at_gp: DMatrix::zeros(n, n),
            rhs_global_kernel_at_gp: DVector::zeros(n),
        }
    }

    pub fn snapshot_init(&mut self) {
        self.q_init_at_gp = self.q_hat_at_gp.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_sizes_match_ndof_and_variables() {
        let e = EdgeData::zeros(3, 5);
        assert_eq!(e.q_hat.nrows(), N_VARIABLES);
        assert_eq!(e.q_hat.ncols(), 3);
        assert_eq!(e.q_hat_at_gp.ncols(), 5);
        assert_eq!(e.delta_hat_global_kernel_at_gp.nrows(), N_VARIABLES * 3);
    }

    #[test]
    fn snapshot_init_copies_current_trace() {
        let mut e = EdgeData::zeros(2, 3);
        e.q_hat_at_gp[(0, 0)] = 7.0;
        e.snapshot_init();
        assert_eq!(e.q_init_at_gp[(0, 0)], 7.0);
    }
}
