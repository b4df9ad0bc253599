//! Global-trace-system solver backend abstraction.
//!
//! ```text
//! Kernel layer (nalgebra DMatrix — small, per-element/per-edge dense)
//!         |
//!         v
//! Trace assembly (produces COO triplets + residual vector)
//!         |
//!         v
//! Backend trait layer (LinearSolver)
//!         |
//!         v
//!     NativeBackend
//! ```

pub mod native;
pub mod traits;

pub use native::NativeBackend;
pub use traits::*;

pub fn default_backend() -> Box<dyn SolverBackend> {
    Box::new(NativeBackend)
}
