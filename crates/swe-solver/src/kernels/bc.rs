//! Boundary-condition specializations.
//!
//! Every specialization only produces an exterior state `q_ex`; the
//! numerical flux itself is always the same local Lax–Friedrichs (LLF)
//! flux, applied uniformly once `q_ex` is known.

use swe_model::element::{N_VARIABLES, VAR_QX, VAR_QY, VAR_ZE};
use swe_model::TidalConstituent;

use crate::environment::Environment;
use crate::kernels::swe_local::flux_at_gp;

/// Local Lax–Friedrichs numerical normal flux, shared by every boundary
/// specialization and by interior interfaces.
pub fn llf_flux(
    env: &Environment,
    q_in: [f64; N_VARIABLES],
    q_ex: [f64; N_VARIABLES],
    bath: f64,
    normal: (f64, f64),
) -> [f64; N_VARIABLES] {
    let h_in = q_in[VAR_ZE] + bath;
    let h_ex = q_ex[VAR_ZE] + bath;
    let (fx_in, fy_in) = flux_at_gp(env, q_in[VAR_ZE], q_in[VAR_QX], q_in[VAR_QY], h_in, bath);
    let (fx_ex, fy_ex) = flux_at_gp(env, q_ex[VAR_ZE], q_ex[VAR_QX], q_ex[VAR_QY], h_ex, bath);

    let (nx, ny) = normal;
    let un_in = (q_in[VAR_QX] * nx + q_in[VAR_QY] * ny) / h_in;
    let un_ex = (q_ex[VAR_QX] * nx + q_ex[VAR_QY] * ny) / h_ex;
    let c_in = (env.g * h_in).sqrt();
    let c_ex = (env.g * h_ex).sqrt();
    let lambda = (un_in.abs() + c_in).max(un_ex.abs() + c_ex);

    let mut f_hat = [0.0; N_VARIABLES];
    for v in 0..N_VARIABLES {
        let f_n_in = fx_in[v] * nx + fy_in[v] * ny;
        let f_n_ex = fx_ex[v] * nx + fy_ex[v] * ny;
        f_hat[v] = 0.5 * (f_n_in + f_n_ex) - 0.5 * lambda * (q_ex[v] - q_in[v]);
    }
    f_hat
}

/// `Land`: reflect the normal momentum component, keep the tangential
/// component (`q_ex = q_in - 2(q_in . n)n`).
pub fn land_exterior_state(q_in: [f64; N_VARIABLES], normal: (f64, f64)) -> [f64; N_VARIABLES] {
    let (nx, ny) = normal;
    let (tx, ty) = (-ny, nx);
    let qn_in = q_in[VAR_QX] * nx + q_in[VAR_QY] * ny;
    let qt_in = q_in[VAR_QX] * tx + q_in[VAR_QY] * ty;
    let qn_ex = -qn_in;
    let qt_ex = qt_in;
    [
        q_in[VAR_ZE],
        qn_ex * nx + qt_ex * tx,
        qn_ex * ny + qt_ex * ty,
    ]
}

/// `Tide`: finite sum of harmonic constituents, ramped, momentum passed
/// through unchanged.
pub fn tide_exterior_state(
    env: &Environment,
    time: f64,
    constituents: &[TidalConstituent],
    q_in: [f64; N_VARIABLES],
) -> [f64; N_VARIABLES] {
    let ramp = env.ramp(time);
    let ze = constituents.iter().fold(0.0, |acc, c| {
        acc + ramp * c.forcing_fact * c.amplitude * (c.omega * time + c.eq_arg - c.phase).cos()
    });
    [ze, q_in[VAR_QX], q_in[VAR_QY]]
}

/// `Function`: caller-supplied closure for manufactured-solution and
/// other prescribed-state tests.
pub fn function_exterior_state(
    env: &Environment,
    time: f64,
    prescribed: &dyn Fn(&Environment, f64) -> [f64; N_VARIABLES],
) -> [f64; N_VARIABLES] {
    prescribed(env, time)
}

/// Dispatch over the three specializations, producing the boundary's
/// numerical flux in one call. `bath` is the exterior bathymetry (taken
/// equal to the interior value, since the trace carries no separate
/// exterior bathymetry field).
pub enum BcSpec<'a> {
    Land,
    Tide(&'a [TidalConstituent]),
    Function(&'a dyn Fn(&Environment, f64) -> [f64; N_VARIABLES]),
}

impl<'a> BcSpec<'a> {
    pub fn compute_flux(
        &self,
        env: &Environment,
        time: f64,
        q_in: [f64; N_VARIABLES],
        bath: f64,
        normal: (f64, f64),
    ) -> [f64; N_VARIABLES] {
        let q_ex = match self {
            BcSpec::Land => land_exterior_state(q_in, normal),
            BcSpec::Tide(constituents) => tide_exterior_state(env, time, constituents, q_in),
            BcSpec::Function(f) => function_exterior_state(env, time, *f),
        };
        llf_flux(env, q_in, q_ex, bath, normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn land_reflects_normal_momentum_and_keeps_tangential() {
        let q_in = [1.0, 2.0, 0.0];
        let normal = (1.0, 0.0);
        let q_ex = land_exterior_state(q_in, normal);
        assert_eq!(q_ex[VAR_ZE], 1.0);
        assert!((q_ex[VAR_QX] - (-2.0)).abs() < 1e-12);
        assert!(q_ex[VAR_QY].abs() < 1e-12);
    }

    #[test]
    fn land_wall_flux_has_zero_mass_flux() {
        let env = Environment::default();
        let q_in = [0.5, 2.0, 0.0];
        let f_hat = BcSpec::Land.compute_flux(&env, 0.0, q_in, 10.0, (1.0, 0.0));
        assert!(f_hat[VAR_ZE].abs() < 1e-9, "mass flux through a wall should vanish: {}", f_hat[VAR_ZE]);
    }

    #[test]
    fn tide_ramps_from_zero() {
        let env = Environment::new(9.8, 1000.0, 1.0, -20.0, 100.0);
        let constituents = [TidalConstituent {
            amplitude: 1.0,
            omega: 0.1,
            eq_arg: 0.0,
            phase: 0.0,
            forcing_fact: 1.0,
        }];
        let q_in = [0.0, 0.0, 0.0];
        let at_zero = tide_exterior_state(&env, 0.0, &constituents, q_in);
        assert_eq!(at_zero[VAR_ZE], 0.0);
    }

    #[test]
    fn function_bc_uses_supplied_closure() {
        let env = Environment::default();
        let prescribed = |_: &Environment, t: f64| [t, 0.0, 0.0];
        let q_ex = function_exterior_state(&env, 3.0, &prescribed);
        assert_eq!(q_ex[VAR_ZE], 3.0);
    }
}
