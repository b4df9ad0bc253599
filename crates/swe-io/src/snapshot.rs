//! Modal-snapshot persistence.
//!
//! VTK/VTU visualization output is handled by an external tool; this
//! module covers the other half of "persisted state" — modal
//! coefficients serialized as flat double arrays per element, keyed by
//! element id — as a JSON document that can be reloaded for a restart.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub schema_version: u32,
    pub step: usize,
    pub time: f64,
    /// Flat modal coefficients per element, keyed by stable element id.
    /// Layout within each value is row-major `(n_variables, ndof)`.
    pub elements: BTreeMap<u64, Vec<f64>>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: 1,
            step: 0,
            time: 0.0,
            elements: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), SolverError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, SolverError> {
    let bytes = fs::read(path)?;
    let snapshot = serde_json::from_slice(&bytes)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_file(prefix: &str, filename: &str) -> PathBuf {
        let pid = std::process::id();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("{prefix}_{pid}_{n}"))
            .join(filename)
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let path = unique_temp_file("swe_snapshot_roundtrip", "snapshot.json");
        let mut elements = BTreeMap::new();
        elements.insert(1u64, vec![0.0, 0.1, -0.2, 1.0, 0.0, 0.0]);
        elements.insert(2u64, vec![0.05, 0.11, -0.19, 0.98, 0.02, -0.01]);

        let snapshot = Snapshot {
            schema_version: 1,
            step: 42,
            time: 4.2,
            elements,
            metadata: BTreeMap::new(),
        };

        save_snapshot(&path, &snapshot).expect("save should succeed");
        let loaded = load_snapshot(&path).expect("load should succeed");
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn load_snapshot_fails_for_missing_file() {
        let path = unique_temp_file("swe_snapshot_missing", "missing.json");
        let err = load_snapshot(&path).expect_err("missing file should fail");
        assert!(matches!(err, SolverError::Io(_)));
    }

    #[test]
    fn load_snapshot_fails_for_invalid_payload() {
        let path = unique_temp_file("swe_snapshot_invalid", "bad.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        let err = load_snapshot(&path).expect_err("invalid JSON should fail");
        assert!(matches!(err, SolverError::Json(_)));
    }
}
