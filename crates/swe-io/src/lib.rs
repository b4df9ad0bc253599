//! Ambient I/O support for the shallow-water/Green–Naghdi solver.
//!
//! This crate provides:
//! - The error taxonomy (`SolverError`) shared across the workspace
//! - A minimal deck-style run-configuration reader (`config`)
//! - JSON-based modal snapshot persistence (`snapshot`)
//! - `tracing`-based logging setup (`logging`)

pub mod config;
pub mod error;
pub mod logging;
pub mod snapshot;

pub use config::{Card, Deck, DeckParseError, ForcingToggles, Parameter, RunConfig};
pub use error::{Result, SolverError};
pub use snapshot::{Snapshot, load_snapshot, save_snapshot};
