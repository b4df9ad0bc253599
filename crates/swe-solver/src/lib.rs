//! Discretization kernels, trace-system backend, and parallel simulation
//! driver for the shallow-water/Green–Naghdi solver.

pub mod backend;
pub mod communicator;
pub mod driver;
pub mod environment;
pub mod kernels;
pub mod stepper;

pub use driver::{Forcing, SimulationDriver};
pub use environment::Environment;
pub use stepper::Stepper;
