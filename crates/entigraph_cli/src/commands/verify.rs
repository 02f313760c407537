//! Verify command implementation.

use entigraph_core::{FilePersister, Snapshot};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of committed records checked.
    pub records_checked: usize,
    /// Number of objects checked.
    pub objects_checked: usize,
    /// Problems that make the log unusable or inconsistent.
    pub errors: Vec<String>,
    /// Problems that opening the log repairs.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks framing, checksums, the checkpoint seal and the replayed graph.
pub fn verify_log(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No log found at {:?}", path).into());
    }
    let mut result = VerifyResult::default();

    let scan = match FilePersister::scan(path) {
        Ok(scan) => scan,
        Err(e) => {
            result.errors.push(format!("Log cannot be read: {}", e));
            return Ok(result);
        }
    };
    result.records_checked = scan.records.len();

    if scan.torn {
        result.warnings.push(format!(
            "Torn frame at offset {}: {} trailing bytes",
            scan.valid_bytes,
            scan.total_bytes - scan.valid_bytes
        ));
    }
    if scan.uncommitted > 0 {
        result.warnings.push(format!(
            "{} records after the last commit will be discarded",
            scan.uncommitted
        ));
    }

    let snapshot = Snapshot::replay(scan.records);
    check_graph(&snapshot, &mut result);
    Ok(result)
}

fn check_graph(snapshot: &Snapshot, result: &mut VerifyResult) {
    for (handle, object) in snapshot.heap.iter() {
        result.objects_checked += 1;
        for target in object.references() {
            if !snapshot.heap.contains(target) {
                result.errors.push(format!(
                    "{} ({}) references missing object {}",
                    handle,
                    object.type_name(),
                    target
                ));
            }
        }
    }

    for (type_name, restored) in &snapshot.collections {
        for member in restored.members.iter() {
            match snapshot.heap.get(member) {
                None => result
                    .errors
                    .push(format!("{} member {} is not stored", type_name, member)),
                Some(object) if object.type_name() != type_name => result.errors.push(format!(
                    "{} member {} has type {}",
                    type_name,
                    member,
                    object.type_name()
                )),
                Some(_) => {}
            }
        }
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log at {:?}", path);
    println!();

    let result = verify_log(path)?;
    println!("  Records checked: {}", result.records_checked);
    println!("  Objects checked: {}", result.objects_checked);
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    for error in &result.errors {
        println!("  error: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Log verification passed");
        Ok(())
    } else {
        println!("✗ Log verification failed");
        Err("Verification failed".into())
    }
}
