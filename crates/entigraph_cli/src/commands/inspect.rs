//! Inspect command implementation.

use super::{format_size, load};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Number of committed records.
    pub record_count: usize,
    /// Number of the last committed batch.
    pub batches: u64,
    /// Whether the log starts with a checkpoint seal.
    pub sealed: bool,
    /// Whether the log ends in a partial or corrupt frame.
    pub torn: bool,
    /// Records past the last commit.
    pub uncommitted: usize,
    /// Live storage objects.
    pub object_count: usize,
    /// Live storage objects per type.
    pub objects_by_type: BTreeMap<String, usize>,
    /// Collection statistics (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<CollectionStats>>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Entity type.
    pub type_name: String,
    /// Number of members.
    pub members: usize,
    /// Last generated identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_id: Option<String>,
}

/// Reads the log and summarizes it.
pub fn analyze(path: &Path, show_collections: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let (scan, snapshot) = load(path)?;

    let mut objects_by_type = BTreeMap::new();
    for (_, object) in snapshot.heap.iter() {
        *objects_by_type
            .entry(object.type_name().to_string())
            .or_insert(0) += 1;
    }

    let collections = show_collections.then(|| {
        snapshot
            .collections
            .iter()
            .map(|(type_name, restored)| CollectionStats {
                type_name: type_name.to_string(),
                members: restored.members.len(),
                last_id: restored.last_id.as_ref().map(|id| id.render()),
            })
            .collect()
    });

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: scan.total_bytes,
        record_count: scan.records.len(),
        batches: scan.batches,
        sealed: scan.sealed,
        torn: scan.torn,
        uncommitted: scan.uncommitted,
        object_count: snapshot.heap.len(),
        objects_by_type,
        collections,
    })
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_collections: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = analyze(path, show_collections)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("EntiGraph Log Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", format_size(result.log_size));
    println!();
    println!("Records:");
    println!("  Committed:   {}", result.record_count);
    println!("  Batches:     {}", result.batches);
    println!("  Uncommitted: {}", result.uncommitted);
    println!("  Sealed:      {}", if result.sealed { "yes" } else { "no" });
    println!("  Torn tail:   {}", if result.torn { "yes" } else { "no" });
    println!();
    println!("Objects: {}", result.object_count);
    for (type_name, count) in &result.objects_by_type {
        println!("  {:<20} {}", type_name, count);
    }

    if let Some(collections) = &result.collections {
        println!();
        println!("Collections:");
        for col in collections {
            match &col.last_id {
                Some(id) => println!("  [{}] {} members, last id {}", col.type_name, col.members, id),
                None => println!("  [{}] {} members", col.type_name, col.members),
            }
        }
    }
}
