//! Master element algebra.
//!
//! Quadrature rule, basis evaluation, and inverse mass matrix for a
//! generic-order triangle basis. Orthonormality is obtained by
//! Gram–Schmidt orthogonalizing the total-degree-`p` monomial basis
//! against the quadrature inner product (a Cholesky factorization of the
//! monomial mass matrix), rather than transcribing closed-form Dubiner
//! polynomials — see `DESIGN.md`.

use nalgebra::{Cholesky, DMatrix, DVector};
use swe_io::SolverError;

use crate::quadrature::TriangleRule;

pub const MAX_SUPPORTED_ORDER: usize = 6;

/// Reference-triangle vertices, in the fixed boundary-node-ordering
/// convention: boundary 0 is the edge opposite vertex 0, etc.
pub const REFERENCE_VERTICES: [(f64, f64); 3] = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];

/// Monomial exponents `(a, b)` for `x^a y^b`, ordered by ascending total
/// degree so the first `3` entries (for `p >= 1`) span exactly the linear
/// polynomials, and the first `1` spans the constants.
fn monomial_exponents(p: usize) -> Vec<(u32, u32)> {
    let mut exps = Vec::new();
    for degree in 0..=p {
        for a in 0..=degree {
            let b = degree - a;
            exps.push((a as u32, b as u32));
        }
    }
    exps
}

fn eval_monomials(exps: &[(u32, u32)], x: f64, y: f64) -> Vec<f64> {
    exps.iter()
        .map(|&(a, b)| x.powi(a as i32) * y.powi(b as i32))
        .collect()
}

fn eval_monomial_derivs(exps: &[(u32, u32)], x: f64, y: f64) -> (Vec<f64>, Vec<f64>) {
    let dx = exps
        .iter()
        .map(|&(a, b)| {
            if a == 0 {
                0.0
            } else {
                a as f64 * x.powi(a as i32 - 1) * y.powi(b as i32)
            }
        })
        .collect();
    let dy = exps
        .iter()
        .map(|&(a, b)| {
            if b == 0 {
                0.0
            } else {
                b as f64 * x.powi(a as i32) * y.powi(b as i32 - 1)
            }
        })
        .collect();
    (dx, dy)
}

/// A read-only reference-element basis/quadrature bundle, shared by every
/// element of identical kind and polynomial order.
#[derive(Debug, Clone)]
pub struct Master {
    pub p: usize,
    pub ndof: usize,
    pub ngp: usize,
    pub nvrtx: usize,
    pub nbound: usize,

    pub quadrature_weights: DVector<f64>,
    pub quadrature_points: Vec<(f64, f64)>,

    /// Basis values at volume quadrature points, shape `(ndof, ngp)`.
    pub phi_gp: DMatrix<f64>,
    /// Basis gradients at volume quadrature points `[d/dx, d/dy]`, each `(ndof, ngp)`.
    pub dphi_gp: [DMatrix<f64>; 2],

    /// Inverse reference mass matrix; diagonal (in fact identity) because
    /// the basis is orthonormal by construction.
    pub m_inv: DMatrix<f64>,

    /// Modal -> vertex-value transfer, shape `(nvrtx, ndof)`.
    pub t_basis_linear: DMatrix<f64>,
    /// Vertex-value -> modal transfer, shape `(ndof, nvrtx)`.
    pub t_linear_basis: DMatrix<f64>,

    /// `phi_gp[i][gp] * weight[gp]`, precomputed for fast `integrate_phi`.
    pub int_phi_fact: DMatrix<f64>,
    /// `dphi_gp[dim][i][gp] * weight[gp]`, precomputed for fast `integrate_dphi`.
    pub int_dphi_fact: [DMatrix<f64>; 2],
}

impl Master {
    pub fn new(p: usize) -> Result<Self, SolverError> {
        if p > MAX_SUPPORTED_ORDER {
            return Err(SolverError::UnsupportedOrder {
                order: p as i64,
                reason: format!("maximum supported polynomial order is {MAX_SUPPORTED_ORDER}"),
            });
        }

        let exps = monomial_exponents(p);
        let ndof = exps.len();
        debug_assert_eq!(ndof, (p + 1) * (p + 2) / 2);

        // Exact through degree 2p+1, enough for the mass matrix.
        let rule = TriangleRule::for_degree(2 * p + 1);
        let ngp = rule.num_points();
        let quadrature_weights = DVector::from_vec(rule.weights.clone());

        let mut mono_vals = DMatrix::<f64>::zeros(ndof, ngp);
        let mut mono_dx = DMatrix::<f64>::zeros(ndof, ngp);
        let mut mono_dy = DMatrix::<f64>::zeros(ndof, ngp);
        for (gp, &(x, y)) in rule.points.iter().enumerate() {
            let vals = eval_monomials(&exps, x, y);
            let (dx, dy) = eval_monomial_derivs(&exps, x, y);
            for i in 0..ndof {
                mono_vals[(i, gp)] = vals[i];
                mono_dx[(i, gp)] = dx[i];
                mono_dy[(i, gp)] = dy[i];
            }
        }

        // Quadrature-based Gram matrix of the monomial basis.
        let mut gram = DMatrix::<f64>::zeros(ndof, ndof);
        for i in 0..ndof {
            for j in 0..ndof {
                let mut acc = 0.0;
                for gp in 0..ngp {
                    acc += quadrature_weights[gp] * mono_vals[(i, gp)] * mono_vals[(j, gp)];
                }
                gram[(i, j)] = acc;
            }
        }

        let chol = Cholesky::new(gram.clone()).ok_or_else(|| SolverError::UnsupportedOrder {
            order: p as i64,
            reason: "monomial Gram matrix was not symmetric positive definite".to_string(),
        })?;
        let l = chol.l();
        let c = l.try_inverse().ok_or_else(|| SolverError::UnsupportedOrder {
            order: p as i64,
            reason: "Cholesky factor was not invertible".to_string(),
        })?;

        let phi_gp = &c * &mono_vals;
        let dphi_gp = [&c * &mono_dx, &c * &mono_dy];

        // Orthonormal basis => mass matrix is exactly the identity.
        let m_inv = DMatrix::<f64>::identity(ndof, ndof);

        let int_phi_fact = scale_columns(&phi_gp, &quadrature_weights);
        let int_dphi_fact = [
            scale_columns(&dphi_gp[0], &quadrature_weights),
            scale_columns(&dphi_gp[1], &quadrature_weights),
        ];

        let (t_basis_linear, t_linear_basis) = build_linear_transfer(&exps, &c, ndof)?;

        Ok(Master {
            p,
            ndof,
            ngp,
            nvrtx: 3,
            nbound: 3,
            quadrature_weights,
            quadrature_points: rule.points,
            phi_gp,
            dphi_gp,
            m_inv,
            t_basis_linear,
            t_linear_basis,
            int_phi_fact,
            int_dphi_fact,
        })
    }

    /// Evaluate all basis functions at arbitrary reference-space points,
    /// shape `(ndof, points.len())`.
    pub fn get_phi(&self, points: &[(f64, f64)]) -> DMatrix<f64> {
        let exps = monomial_exponents(self.p);
        let c = &self.phi_gp_to_coeff_matrix();
        let mut out = DMatrix::<f64>::zeros(self.ndof, points.len());
        for (col, &(x, y)) in points.iter().enumerate() {
            let vals = eval_monomials(&exps, x, y);
            let v = DVector::from_vec(vals);
            let phi_col = c * v;
            out.set_column(col, &phi_col);
        }
        out
    }

    /// Recover the monomial-to-orthonormal change-of-basis matrix `C` from
    /// `phi_gp` and the (already orthonormal) quadrature; cached nowhere
    /// because `get_phi` is for ad hoc evaluation (postprocessing), not the
    /// hot per-stage loop, which always uses the precomputed `phi_gp`.
    fn phi_gp_to_coeff_matrix(&self) -> DMatrix<f64> {
        // phi_gp = C * mono_vals at construction; since mono_vals at the
        // construction quadrature points is generally non-square we cannot
        // invert it directly here. Instead this recomputes C the same way
        // `new` did, which is cheap relative to assembly and keeps this
        // path free of cached mutable state (Master is read-only post
        // construction).
        let exps = monomial_exponents(self.p);
        let ndof = exps.len();
        let rule = TriangleRule::for_degree(2 * self.p + 1);
        let mut mono_vals = DMatrix::<f64>::zeros(ndof, rule.num_points());
        for (gp, &(x, y)) in rule.points.iter().enumerate() {
            let vals = eval_monomials(&exps, x, y);
            for i in 0..ndof {
                mono_vals[(i, gp)] = vals[i];
            }
        }
        let weights = DVector::from_vec(rule.weights.clone());
        let mut gram = DMatrix::<f64>::zeros(ndof, ndof);
        for i in 0..ndof {
            for j in 0..ndof {
                let mut acc = 0.0;
                for gp in 0..rule.num_points() {
                    acc += weights[gp] * mono_vals[(i, gp)] * mono_vals[(j, gp)];
                }
                gram[(i, j)] = acc;
            }
        }
        let chol = Cholesky::new(gram).expect("gram matrix recomputation is SPD by construction");
        chol.l()
            .try_inverse()
            .expect("Cholesky factor recomputation is invertible by construction")
    }

    pub fn get_dphi(&self, points: &[(f64, f64)]) -> [DMatrix<f64>; 2] {
        let exps = monomial_exponents(self.p);
        let c = self.phi_gp_to_coeff_matrix();
        let mut dx_out = DMatrix::<f64>::zeros(self.ndof, points.len());
        let mut dy_out = DMatrix::<f64>::zeros(self.ndof, points.len());
        for (col, &(x, y)) in points.iter().enumerate() {
            let (dx, dy) = eval_monomial_derivs(&exps, x, y);
            dx_out.set_column(col, &(&c * DVector::from_vec(dx)));
            dy_out.set_column(col, &(&c * DVector::from_vec(dy)));
        }
        [dx_out, dy_out]
    }

    pub fn get_m_inv(&self) -> &DMatrix<f64> {
        &self.m_inv
    }

    /// Project modal coefficients (`ndof` long, per variable) to the three
    /// reference vertices.
    pub fn project_basis_to_linear(&self, u: &DVector<f64>) -> DVector<f64> {
        &self.t_basis_linear * u
    }

    /// Lift three vertex values to modal coefficients representing the
    /// unique linear field interpolating them (higher modes are zero).
    pub fn project_linear_to_basis(&self, u_lin: &DVector<f64>) -> DVector<f64> {
        &self.t_linear_basis * u_lin
    }
}

fn scale_columns(m: &DMatrix<f64>, weights: &DVector<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for gp in 0..m.ncols() {
        let w = weights[gp];
        for i in 0..m.nrows() {
            out[(i, gp)] *= w;
        }
    }
    out
}

fn build_linear_transfer(
    exps: &[(u32, u32)],
    c: &DMatrix<f64>,
    ndof: usize,
) -> Result<(DMatrix<f64>, DMatrix<f64>), SolverError> {
    // phi_k(vertex_v) for every basis function k, every vertex v.
    let mut phi_at_vertices = DMatrix::<f64>::zeros(ndof, 3);
    for (v, &(vx, vy)) in REFERENCE_VERTICES.iter().enumerate() {
        let mono = DVector::from_vec(eval_monomials(exps, vx, vy));
        let phi_v = c * mono;
        phi_at_vertices.set_column(v, &phi_v);
    }

    // t_basis_linear: (3, ndof), row v = phi_at_vertices column v transposed.
    let t_basis_linear = phi_at_vertices.transpose();

    // The 3x3 block restricted to the first three (linear) modes.
    let m3 = t_basis_linear.view((0, 0), (3, 3)).clone_owned();
    let m3_inv = m3
        .try_inverse()
        .ok_or_else(|| SolverError::UnsupportedOrder {
            order: -1,
            reason: "linear vertex-value matrix was singular".to_string(),
        })?;

    let mut t_linear_basis = DMatrix::<f64>::zeros(ndof, 3);
    t_linear_basis.view_mut((0, 0), (3, 3)).copy_from(&m3_inv);

    Ok((t_basis_linear, t_linear_basis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_order_is_unsupported() {
        let err = Master::new(MAX_SUPPORTED_ORDER + 1).expect_err("should reject high order");
        assert!(matches!(err, SolverError::UnsupportedOrder { .. }));
    }

    #[test]
    fn ndof_matches_triangular_number() {
        for p in 0..=4 {
            let m = Master::new(p).unwrap();
            assert_eq!(m.ndof, (p + 1) * (p + 2) / 2);
        }
    }

    #[test]
    fn phi_gp_shape_is_ndof_by_ngp() {
        let m = Master::new(2).unwrap();
        assert_eq!(m.phi_gp.nrows(), m.ndof);
        assert_eq!(m.phi_gp.ncols(), m.ngp);
    }

    #[test]
    fn mass_matrix_is_identity_for_orthonormal_basis() {
        let m = Master::new(3).unwrap();
        for i in 0..m.ndof {
            for j in 0..m.ndof {
                let mut acc = 0.0;
                for gp in 0..m.ngp {
                    acc += m.quadrature_weights[gp] * m.phi_gp[(i, gp)] * m.phi_gp[(j, gp)];
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (acc - expected).abs() < 1e-9,
                    "mass[{i}][{j}] = {acc}, expected {expected}"
                );
            }
        }
        assert!(m.m_inv.is_identity(1e-12));
    }

    #[test]
    fn basis_linear_roundtrip_is_identity() {
        let m = Master::new(2).unwrap();
        let u_lin = DVector::from_vec(vec![1.0, 2.5, -0.5]);
        let modal = m.project_linear_to_basis(&u_lin);
        let back = m.project_basis_to_linear(&modal);
        for i in 0..3 {
            assert!((back[i] - u_lin[i]).abs() < 1e-9);
        }
    }
}
