//! The problem kernels: local (per-element) volume/source/boundary
//! projection, global (per-edge) flux and trace solve, boundary-condition
//! specializations, and the Green–Naghdi dispersive correction.

pub mod bc;
pub mod gn;
pub mod swe_global;
pub mod swe_local;
