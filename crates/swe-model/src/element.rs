//! Per-element state.
//!
//! A plain data struct with a validating constructor; the stage-state
//! array carries one slot per RK stage plus the post-step result, and
//! each element also keeps its own volume/boundary trace blocks.

use nalgebra::DMatrix;
use swe_io::SolverError;

/// Conserved variable indices into every `(n_variables, _)` block.
pub const VAR_ZE: usize = 0;
pub const VAR_QX: usize = 1;
pub const VAR_QY: usize = 2;
pub const N_VARIABLES: usize = 3;

/// Auxiliary variable indices into every `(n_aux, _)` block.
pub const AUX_BATH: usize = 0;
pub const AUX_H: usize = 1;
pub const N_AUX: usize = 2;

/// One RK (or implicit) stage's modal state for a single element.
#[derive(Debug, Clone)]
pub struct StageState {
    /// Modal coefficients, shape `(N_VARIABLES, ndof)`.
    pub q: DMatrix<f64>,
    /// Assembled right-hand side, same shape as `q`.
    pub rhs: DMatrix<f64>,
    /// Solution increment after the trace solve / post-receive kernel.
    pub solution: DMatrix<f64>,
}

impl StageState {
    pub fn zeros(ndof: usize) -> Self {
        StageState {
            q: DMatrix::zeros(N_VARIABLES, ndof),
            rhs: DMatrix::zeros(N_VARIABLES, ndof),
            solution: DMatrix::zeros(N_VARIABLES, ndof),
        }
    }
}

/// Values held at volume quadrature points.
#[derive(Debug, Clone)]
pub struct Internal {
    pub q_at_gp: DMatrix<f64>,
    pub aux_at_gp: DMatrix<f64>,
}

impl Internal {
    pub fn zeros(ngp: usize) -> Self {
        Internal {
            q_at_gp: DMatrix::zeros(N_VARIABLES, ngp),
            aux_at_gp: DMatrix::zeros(N_AUX, ngp),
        }
    }
}

/// Values held at one edge's quadrature points, as seen from this element.
#[derive(Debug, Clone)]
pub struct BoundaryTrace {
    pub q_at_gp: DMatrix<f64>,
    pub aux_at_gp: DMatrix<f64>,
    pub f_hat_at_gp: DMatrix<f64>,
}

impl BoundaryTrace {
    pub fn zeros(ngp: usize) -> Self {
        BoundaryTrace {
            q_at_gp: DMatrix::zeros(N_VARIABLES, ngp),
            aux_at_gp: DMatrix::zeros(N_AUX, ngp),
            f_hat_at_gp: DMatrix::zeros(N_VARIABLES, ngp),
        }
    }
}

/// Per-element numerical state: stage history, volume cache, and one
/// boundary-trace cache per edge.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub id: usize,
    pub ndof: usize,
    pub nbound: usize,
    pub state: Vec<StageState>,
    pub internal: Internal,
    pub boundary: Vec<BoundaryTrace>,
    /// `true` once this element has been flagged dry by the driver; while
    /// dry, `h <= 0` does not trip `aux_at_gp` consistency checks.
    pub dry: bool,
    pub bathymetry: f64,
}

impl ElementData {
    /// `nstages` is the RK/implicit stage count; `state` is sized
    /// `nstages + 1` so the post-step result has its own slot.
    pub fn new(
        id: usize,
        ndof: usize,
        ngp: usize,
        nbound: usize,
        nstages: usize,
        bathymetry: f64,
    ) -> Result<Self, SolverError> {
        if nbound == 0 {
            return Err(SolverError::MeshInconsistent(format!(
                "element {id}: nbound must be positive"
            )));
        }
        let state = (0..=nstages).map(|_| StageState::zeros(ndof)).collect();
        let boundary = (0..nbound).map(|_| BoundaryTrace::zeros(ngp)).collect();
        let mut internal = Internal::zeros(ngp);
        for gp in 0..ngp {
            internal.aux_at_gp[(AUX_BATH, gp)] = bathymetry;
        }
        Ok(ElementData {
            id,
            ndof,
            nbound,
            state,
            internal,
            boundary,
            dry: false,
            bathymetry,
        })
    }

    /// Recompute `aux_at_gp[H]` from the current free-surface elevation and
    /// bathymetry, enforcing the `h > 0` invariant unless flagged dry.
    pub fn refresh_internal_aux(&mut self) -> Result<(), SolverError> {
        let ngp = self.internal.q_at_gp.ncols();
        for gp in 0..ngp {
            let ze = self.internal.q_at_gp[(VAR_ZE, gp)];
            let bath = self.internal.aux_at_gp[(AUX_BATH, gp)];
            let h = ze + bath;
            self.internal.aux_at_gp[(AUX_H, gp)] = h;
            if h <= 0.0 && !self.dry {
                return Err(SolverError::NumericalInstability(format!(
                    "element {}: non-positive water depth h={h} at quadrature point {gp}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Same consistency check, applied to one boundary trace block.
    pub fn refresh_boundary_aux(&mut self, bound_id: usize) -> Result<(), SolverError> {
        let trace = self
            .boundary
            .get_mut(bound_id)
            .ok_or_else(|| SolverError::MeshInconsistent(format!("bound_id {bound_id} out of range")))?;
        let ngp = trace.q_at_gp.ncols();
        let dry = self.dry;
        for gp in 0..ngp {
            let ze = trace.q_at_gp[(VAR_ZE, gp)];
            let bath = trace.aux_at_gp[(AUX_BATH, gp)];
            let h = ze + bath;
            trace.aux_at_gp[(AUX_H, gp)] = h;
            if h <= 0.0 && !dry {
                return Err(SolverError::NumericalInstability(format!(
                    "element {}: non-positive water depth h={h} on boundary {bound_id}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Scan every stage's `q`/`rhs`/`solution` for NaN, used by the
    /// driver's post-stage scrutiny step.
    pub fn has_nan(&self) -> bool {
        self.state.iter().any(|s| {
            s.q.iter().any(|v| v.is_nan())
                || s.rhs.iter().any(|v| v.is_nan())
                || s.solution.iter().any(|v| v.is_nan())
        })
    }

    /// End-of-step state rotation: `state[0] = state[nstages]`, by direct
    /// assignment rather than pointer-swapping, to avoid aliasing hazards
    /// under thread-parallel iteration.
    pub fn rotate_stage(&mut self) {
        let last = self.state.len() - 1;
        self.state[0] = self.state[last].clone();
    }
}
