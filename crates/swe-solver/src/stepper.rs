//! Stage sequencer.
//!
//! Wraps a `swe_model::RkTableau` with the driver-visible cursor: current
//! step, current stage, and elapsed simulation time. Supports both the
//! explicit SSP-RK advance used for SWE and the implicit advance used for
//! IHDG trace solves; both share the same stage-rotation bookkeeping, so
//! one `Stepper` type covers both rather than two.

use swe_model::RkTableau;

use crate::environment::Environment;

#[derive(Debug, Clone)]
pub struct Stepper {
    tableau: RkTableau,
    dt: f64,
    step: u64,
    stage: usize,
    time: f64,
}

impl Stepper {
    pub fn new(tableau: RkTableau, dt: f64) -> Self {
        Stepper {
            tableau,
            dt,
            step: 0,
            stage: 0,
            time: 0.0,
        }
    }

    pub fn get_dt(&self) -> f64 {
        self.dt
    }

    pub fn get_stage(&self) -> usize {
        self.stage
    }

    pub fn num_stages(&self) -> usize {
        self.tableau.nstages
    }

    /// Strictly-increasing per-stage counter: `step * nstages + stage`.
    /// Distinct from `step` alone, which only changes at full-step
    /// rollover — every stage within a step needs its own value so a
    /// distributed-boundary exchange tag never repeats mid-step.
    pub fn get_timestamp(&self) -> u64 {
        self.step * self.tableau.nstages as u64 + self.stage as u64
    }

    /// Simulation time at the start of the current stage:
    /// `t_step + c[stage] * dt`.
    pub fn get_time_at_current_stage(&self) -> f64 {
        let step_start = self.step as f64 * self.dt;
        step_start + self.tableau.c[self.stage] * self.dt
    }

    pub fn get_ramp(&self, env: &Environment) -> f64 {
        env.ramp(self.get_time_at_current_stage())
    }

    pub fn tableau(&self) -> &RkTableau {
        &self.tableau
    }

    /// Advance one stage; at the last stage, roll over into the next
    /// step and advance time by `dt`.
    pub fn advance_stage(&mut self) {
        if self.stage + 1 >= self.tableau.nstages {
            self.stage = 0;
            self.step += 1;
            self.time += self.dt;
        } else {
            self.stage += 1;
        }
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_stage_cycles_and_increments_step_at_rollover() {
        let mut stepper = Stepper::new(RkTableau::ssp_rk3(), 0.1);
        assert_eq!(stepper.get_stage(), 0);
        assert_eq!(stepper.get_timestamp(), 0);

        stepper.advance_stage();
        assert_eq!(stepper.get_stage(), 1);
        assert_eq!(stepper.get_timestamp(), 1);
        stepper.advance_stage();
        assert_eq!(stepper.get_stage(), 2);
        assert_eq!(stepper.get_timestamp(), 2);
        stepper.advance_stage();
        assert_eq!(stepper.get_stage(), 0);
        assert_eq!(stepper.get_timestamp(), 3);
        assert!((stepper.current_time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn ramp_uses_time_at_current_stage() {
        let mut stepper = Stepper::new(RkTableau::forward_euler(), 1.0);
        let env = Environment::new(9.8, 1000.0, 1.0, -20.0, 10.0);
        assert_eq!(stepper.get_ramp(&env), 0.0);
        for _ in 0..20 {
            stepper.advance_stage();
        }
        assert_eq!(stepper.get_ramp(&env), 1.0);
    }
}
