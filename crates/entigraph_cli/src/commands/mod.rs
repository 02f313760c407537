//! CLI command implementations.

pub mod compact;
pub mod dump_log;
pub mod inspect;
pub mod verify;

use entigraph_core::{FilePersister, LogScan, Snapshot};
use std::path::Path;

/// Scans the log at `path` and replays its committed records.
pub(crate) fn load(path: &Path) -> Result<(LogScan, Snapshot), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No log found at {:?}", path).into());
    }
    let scan = FilePersister::scan(path)?;
    let snapshot = Snapshot::replay(scan.records.clone());
    Ok((scan, snapshot))
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
