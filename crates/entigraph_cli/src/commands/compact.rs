//! Compact command implementation.

use super::format_size;
use entigraph_core::{Config, MemoryPersister, Store};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Compaction result.
#[derive(Debug)]
pub struct CompactResult {
    /// Log size before compaction.
    pub original_size: u64,
    /// Log size after compaction.
    pub compacted_size: u64,
    /// Objects freed by garbage collection.
    pub objects_freed: usize,
}

/// Rewrites the log as a single sealed checkpoint, optionally collecting
/// unreachable objects first. A dry run compacts an in-memory copy and
/// leaves the file untouched.
pub fn compact(
    path: &Path,
    collect_garbage: bool,
    dry_run: bool,
) -> Result<CompactResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No log found at {:?}", path).into());
    }
    let original_size = fs::metadata(path)?.len();
    let config = Config::default().create_if_missing(false);

    if dry_run {
        let persister = Arc::new(MemoryPersister::from_bytes(fs::read(path)?)?);
        let store = Store::open(config, persister.clone())?;
        let objects_freed = maybe_collect(&store, collect_garbage)?;
        store.checkpoint()?;
        return Ok(CompactResult {
            original_size,
            compacted_size: persister.bytes().len() as u64,
            objects_freed,
        });
    }

    let store = Store::open_file(path, config)?;
    let objects_freed = maybe_collect(&store, collect_garbage)?;
    store.checkpoint()?;
    drop(store);

    let compacted_size = fs::metadata(path)?.len();
    info!(original_size, compacted_size, objects_freed, "compacted log");
    Ok(CompactResult {
        original_size,
        compacted_size,
        objects_freed,
    })
}

fn maybe_collect(store: &Store, enabled: bool) -> Result<usize, Box<dyn std::error::Error>> {
    if enabled {
        Ok(store.collect_garbage()?)
    } else {
        Ok(0)
    }
}

/// Runs the compact command.
pub fn run(
    path: &Path,
    collect_garbage: bool,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        println!("Dry run: {:?} will not be modified", path);
    }
    let result = compact(path, collect_garbage, dry_run)?;

    println!("Original size:  {} bytes", format_size(result.original_size));
    println!("Compacted size: {} bytes", format_size(result.compacted_size));
    if collect_garbage {
        println!("Objects freed:  {}", result.objects_freed);
    }
    let saved = result.original_size.saturating_sub(result.compacted_size);
    println!("Reclaimed:      {} bytes", format_size(saved));
    Ok(())
}
