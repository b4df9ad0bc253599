//! Native linear-solver backend using nalgebra's dense LU.
//!
//! Reconstructs a dense matrix from COO triplets, then LU-solves.
//! Suitable for the small-to-medium trace systems this solver assembles
//! per simulation unit; a sparse iterative backend (GMRES/ILU) is left
//! to an external PETSc-backed implementation of the same trait.

use nalgebra::DMatrix;

use super::traits::{BackendError, LinearSolver, LinearSystemData, SolveInfo, SolverBackend};

pub struct NativeBackend;

impl LinearSolver for NativeBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(nalgebra::DVector<f64>, SolveInfo), BackendError> {
        let n = system.num_dofs;
        let mut k = DMatrix::zeros(n, n);
        for i in 0..system.matrix.nnz() {
            let r = system.matrix.row_indices[i];
            let c = system.matrix.col_indices[i];
            k[(r, c)] += system.matrix.values[i];
        }

        let x = k
            .clone()
            .lu()
            .solve(&system.rhs)
            .ok_or_else(|| BackendError("singular matrix in trace-system LU decomposition".to_string()))?;

        let residual = (&k * &x) - &system.rhs;

        Ok((
            x,
            SolveInfo {
                iterations: 1,
                residual_norm: Some(residual.norm()),
                solver_name: "nalgebra-LU".to_string(),
            },
        ))
    }
}

impl SolverBackend for NativeBackend {
    fn name(&self) -> &str {
        "native-nalgebra"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::traits::SparseTripletsF64;
    use nalgebra::DVector;

    #[test]
    fn solves_small_diagonal_system() {
        let backend = NativeBackend;
        let system = LinearSystemData {
            matrix: SparseTripletsF64 {
                nrows: 2,
                ncols: 2,
                row_indices: vec![0, 1],
                col_indices: vec![0, 1],
                values: vec![2.0, 4.0],
            },
            rhs: DVector::from_vec(vec![4.0, 8.0]),
            num_dofs: 2,
        };
        let (x, info) = backend.solve_linear(&system).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!(info.residual_norm.unwrap() < 1e-9);
    }

    #[test]
    fn singular_system_is_rejected() {
        let backend = NativeBackend;
        let system = LinearSystemData {
            matrix: SparseTripletsF64 {
                nrows: 2,
                ncols: 2,
                row_indices: vec![0, 1],
                col_indices: vec![0, 1],
                values: vec![1.0, 0.0],
            },
            rhs: DVector::from_vec(vec![1.0, 1.0]),
            num_dofs: 2,
        };
        assert!(backend.solve_linear(&system).is_err());
    }
}
