//! Runge–Kutta tableau.
//!
//! Pure data: the `Stepper` in the solver crate drives stage sequencing
//! and state rotation against one of these.

/// Butcher tableau for an explicit (or diagonally implicit) scheme.
/// `a[i][j]` is only meaningful for `j <= i` (explicit lower-triangular
/// schemes are all this system needs — SSP-RK for the shallow-water
/// equations).
#[derive(Debug, Clone)]
pub struct RkTableau {
    pub nstages: usize,
    pub a: Vec<Vec<f64>>,
    pub b: Vec<f64>,
    pub c: Vec<f64>,
}

impl RkTableau {
    pub fn forward_euler() -> Self {
        RkTableau {
            nstages: 1,
            a: vec![vec![0.0]],
            b: vec![1.0],
            c: vec![0.0],
        }
    }

    /// Strong-stability-preserving 2-stage, 2nd-order (Heun's method).
    pub fn ssp_rk2() -> Self {
        RkTableau {
            nstages: 2,
            a: vec![vec![0.0, 0.0], vec![1.0, 0.0]],
            b: vec![0.5, 0.5],
            c: vec![0.0, 1.0],
        }
    }

    /// Strong-stability-preserving 3-stage, 3rd-order (Shu–Osher).
    pub fn ssp_rk3() -> Self {
        RkTableau {
            nstages: 3,
            a: vec![
                vec![0.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.25, 0.25, 0.0],
            ],
            b: vec![1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0],
            c: vec![0.0, 1.0, 0.5],
        }
    }
}
