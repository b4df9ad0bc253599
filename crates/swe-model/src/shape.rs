//! Reference-to-physical mapping.
//!
//! Affine triangle map: shape functions, Jacobian, and a Newton
//! inversion loop for the reverse direction. The Newton loop converges
//! in one step for a straight-sided (affine) triangle, but is kept as
//! an iteration so the same code can support an isoparametric/curved
//! element later without changing its contract.

use nalgebra::{Matrix2, Vector2};
use swe_io::SolverError;

use crate::master::REFERENCE_VERTICES;

const NEWTON_TOL: f64 = 1e-12;
const NEWTON_MAX_ITER: usize = 50;

/// Physical geometry of one straight-sided triangular element.
#[derive(Debug, Clone)]
pub struct Shape {
    pub nodal_coordinates: [(f64, f64); 3],
}

impl Shape {
    pub fn new(nodal_coordinates: [(f64, f64); 3]) -> Self {
        Shape { nodal_coordinates }
    }

    fn vertex(&self, i: usize) -> Vector2<f64> {
        let (x, y) = self.nodal_coordinates[i];
        Vector2::new(x, y)
    }

    /// Constant Jacobian `d(X,Y)/d(x,y)` for the affine map
    /// `X(x,y) = p0 + (p1-p0) x + (p2-p0) y`.
    fn jacobian(&self) -> Matrix2<f64> {
        let p0 = self.vertex(0);
        let p1 = self.vertex(1);
        let p2 = self.vertex(2);
        Matrix2::new(p1.x - p0.x, p2.x - p0.x, p1.y - p0.y, p2.y - p0.y)
    }

    pub fn get_jdet(&self, points: &[(f64, f64)]) -> Vec<f64> {
        let det = self.jacobian().determinant();
        vec![det; points.len()]
    }

    pub fn get_jinv(&self, points: &[(f64, f64)]) -> Result<Vec<Matrix2<f64>>, SolverError> {
        let j = self.jacobian();
        let j_inv = j.try_inverse().ok_or_else(|| SolverError::MeshInconsistent(
            "element Jacobian is singular (degenerate triangle, det J <= 0)".to_string(),
        ))?;
        Ok(vec![j_inv; points.len()])
    }

    pub fn local_to_global(&self, points: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let p0 = self.vertex(0);
        let j = self.jacobian();
        points
            .iter()
            .map(|&(x, y)| {
                let global = p0 + j * Vector2::new(x, y);
                (global.x, global.y)
            })
            .collect()
    }

    /// Newton inversion of `local_to_global`, tolerance `1e-12`; fails
    /// with `kInversionDivergent` if it does not converge within
    /// `NEWTON_MAX_ITER` iterations.
    pub fn global_to_local(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, SolverError> {
        let p0 = self.vertex(0);
        let j = self.jacobian();
        let j_inv = j
            .try_inverse()
            .ok_or_else(|| SolverError::MeshInconsistent("singular element Jacobian".to_string()))?;

        let mut out = Vec::with_capacity(points.len());
        for &(gx, gy) in points {
            let target = Vector2::new(gx, gy);
            let mut local = Vector2::new(1.0 / 3.0, 1.0 / 3.0);
            let mut converged = false;
            for _ in 0..NEWTON_MAX_ITER {
                let residual = (p0 + j * local) - target;
                if residual.norm() <= NEWTON_TOL {
                    converged = true;
                    break;
                }
                local -= j_inv * residual;
            }
            let residual_norm = ((p0 + j * local) - target).norm();
            if !converged && residual_norm > NEWTON_TOL {
                return Err(SolverError::InversionDivergent {
                    iterations: NEWTON_MAX_ITER,
                    residual: residual_norm,
                });
            }
            out.push((local.x, local.y));
        }
        Ok(out)
    }

    pub fn contains_point(&self, point: (f64, f64)) -> Result<bool, SolverError> {
        let local = self.global_to_local(&[point])?[0];
        let (x, y) = local;
        const EPS: f64 = 1e-9;
        Ok(x >= -EPS && y >= -EPS && x + y <= 1.0 + EPS)
    }

    /// Vertex indices bounding a given edge, following the convention that
    /// edge `b` is the edge traversed `v_(b+1) -> v_(b+2)` when walking the
    /// triangle boundary counter-clockwise (i.e. the edge opposite vertex `b`).
    pub fn boundary_node_ids(bound_id: usize) -> (usize, usize) {
        ((bound_id + 1) % 3, (bound_id + 2) % 3)
    }

    pub fn get_surface_j(&self, bound_id: usize) -> f64 {
        let (i, j) = Self::boundary_node_ids(bound_id);
        let edge = self.vertex(j) - self.vertex(i);
        edge.norm() / 2.0
    }

    /// Outward unit normal of boundary `bound_id`, constant along a straight edge.
    pub fn get_surface_normal(&self, bound_id: usize) -> (f64, f64) {
        let (i, j) = Self::boundary_node_ids(bound_id);
        let edge = self.vertex(j) - self.vertex(i);
        let len = edge.norm();
        (edge.y / len, -edge.x / len)
    }

    pub fn get_area(&self) -> f64 {
        self.jacobian().determinant().abs() / 2.0
    }

    pub fn get_barycentric_coordinates(&self) -> (f64, f64, f64) {
        let p = self.vertex(0) / 3.0 + self.vertex(1) / 3.0 + self.vertex(2) / 3.0;
        (p.x, p.y, 0.0)
    }
}

/// Map reference-triangle boundary quadrature points (a 1-D rule on `[-1,1]`
/// along edge `bound_id`) onto the full 2-D reference triangle, using the
/// same boundary ordering as [`Shape::boundary_node_ids`].
pub fn boundary_to_master_coordinates(bound_id: usize, z: f64) -> (f64, f64) {
    let (i, j) = Shape::boundary_node_ids(bound_id);
    let t = (z + 1.0) / 2.0; // z in [-1,1] -> t in [0,1]
    let a = REFERENCE_VERTICES[i];
    let b = REFERENCE_VERTICES[j];
    (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_shape() -> Shape {
        Shape::new([(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)])
    }

    #[test]
    fn jdet_is_positive_for_ccw_triangle() {
        let s = reference_shape();
        let dets = s.get_jdet(&[(0.3, 0.3)]);
        assert!(dets[0] > 0.0);
    }

    #[test]
    fn normals_are_unit_and_outward() {
        let s = reference_shape();
        for b in 0..3 {
            let (nx, ny) = s.get_surface_normal(b);
            assert!((nx * nx + ny * ny - 1.0).abs() < 1e-12);
        }
        // hypotenuse (boundary 0) points into the first quadrant
        let (nx, ny) = s.get_surface_normal(0);
        assert!(nx > 0.0 && ny > 0.0);
        // left edge (boundary 1) points in -x
        let (nx, _) = s.get_surface_normal(1);
        assert!(nx < 0.0);
        // bottom edge (boundary 2) points in -y
        let (_, ny) = s.get_surface_normal(2);
        assert!(ny < 0.0);
    }

    #[test]
    fn local_to_global_then_global_to_local_is_identity() {
        let s = Shape::new([(1.0, 1.0), (4.0, 1.5), (2.0, 5.0)]);
        let pts = vec![(0.2, 0.3), (0.5, 0.1), (1.0 / 3.0, 1.0 / 3.0)];
        let global = s.local_to_global(&pts);
        let back = s.global_to_local(&global).expect("inversion should converge");
        for (orig, recovered) in pts.iter().zip(back.iter()) {
            assert!((orig.0 - recovered.0).abs() < 1e-9);
            assert!((orig.1 - recovered.1).abs() < 1e-9);
        }
    }

    #[test]
    fn contains_point_detects_interior_and_exterior() {
        let s = reference_shape();
        assert!(s.contains_point((0.25, 0.25)).unwrap());
        assert!(!s.contains_point((0.9, 0.9)).unwrap());
    }

    #[test]
    fn degenerate_triangle_is_mesh_inconsistent() {
        let s = Shape::new([(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let err = s.global_to_local(&[(0.5, 0.0)]).expect_err("should fail");
        assert!(matches!(err, SolverError::MeshInconsistent(_)));
    }
}
