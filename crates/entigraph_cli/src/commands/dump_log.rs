//! Dump log command implementation.

use super::load;
use entigraph_core::LogRecord;
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Position among committed records.
    pub index: usize,
    /// Record kind.
    pub record_type: String,
    /// Entity type (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Storage handle (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Batch number (commit records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u64>,
    /// Short rendering of the record's content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LogRecordInfo {
    fn new(index: usize, record_type: &str) -> Self {
        Self {
            index,
            record_type: record_type.to_string(),
            type_name: None,
            handle: None,
            batch: None,
            detail: None,
        }
    }
}

/// Describes one record.
pub fn describe(index: usize, record: &LogRecord) -> LogRecordInfo {
    match record {
        LogRecord::Collection { type_name } => LogRecordInfo {
            type_name: Some(type_name.to_string()),
            ..LogRecordInfo::new(index, "COLLECTION")
        },
        LogRecord::Object { handle, object } => LogRecordInfo {
            type_name: Some(object.type_name().to_string()),
            handle: Some(handle.to_string()),
            detail: Some(format!("{} fields", object.field_count())),
            ..LogRecordInfo::new(index, "OBJECT")
        },
        LogRecord::Freed { handle } => LogRecordInfo {
            handle: Some(handle.to_string()),
            ..LogRecordInfo::new(index, "FREED")
        },
        LogRecord::Member {
            type_name,
            handle,
            present,
        } => LogRecordInfo {
            type_name: Some(type_name.to_string()),
            handle: Some(handle.to_string()),
            ..LogRecordInfo::new(index, if *present { "MEMBER+" } else { "MEMBER-" })
        },
        LogRecord::Cursor { type_name, id } => LogRecordInfo {
            type_name: Some(type_name.to_string()),
            detail: Some(id.as_ref().map_or_else(|| "none".to_string(), |id| id.render())),
            ..LogRecordInfo::new(index, "CURSOR")
        },
        LogRecord::Commit { batch } => LogRecordInfo {
            batch: Some(*batch),
            ..LogRecordInfo::new(index, "COMMIT")
        },
        LogRecord::Seal { records, digest } => LogRecordInfo {
            detail: Some(format!("{} records, sha256 {}", records, hex_prefix(digest))),
            ..LogRecordInfo::new(index, "SEAL")
        },
    }
}

/// Reads up to `limit` committed records starting at record `offset`.
pub fn read_records(
    path: &Path,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<LogRecordInfo>, Box<dyn std::error::Error>> {
    let (scan, _) = load(path)?;
    Ok(scan
        .records
        .iter()
        .enumerate()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, record)| describe(index, record))
        .collect())
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    offset: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = read_records(path, limit, offset)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("Log Records");
    println!("===========");
    println!();

    if records.is_empty() {
        println!("No records found.");
        return;
    }

    for record in records {
        print!("[{:>6}] {:<10}", record.index, record.record_type);
        if let Some(type_name) = &record.type_name {
            print!(" type={}", type_name);
        }
        if let Some(handle) = &record.handle {
            print!(" handle={}", handle);
        }
        if let Some(batch) = record.batch {
            print!(" batch={}", batch);
        }
        if let Some(detail) = &record.detail {
            print!(" ({})", detail);
        }
        println!();
    }

    println!();
    println!("Total: {} records", records.len());
}

fn hex_prefix(digest: &[u8; 32]) -> String {
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigraph_testkit::{account, TestStore};

    #[test]
    fn test_records_end_in_commits() {
        let test_store = TestStore::file();
        test_store.save(&account(3)).unwrap();
        let path = test_store.path().unwrap();

        let records = read_records(&path, None, 0).unwrap();
        assert_eq!(records.last().unwrap().record_type, "COMMIT");
        assert!(records.iter().any(|r| r.record_type == "OBJECT"
            && r.type_name.as_deref() == Some("Account")));
        assert!(records.iter().any(|r| r.record_type == "MEMBER+"));
    }

    #[test]
    fn test_limit_and_offset() {
        let test_store = TestStore::file();
        test_store.save(&account(1)).unwrap();
        test_store.save(&account(2)).unwrap();
        let path = test_store.path().unwrap();

        let all = read_records(&path, None, 0).unwrap();
        let window = read_records(&path, Some(2), 1).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].index, 1);
        assert_eq!(window[1].record_type, all[2].record_type);
    }

    #[test]
    fn test_checkpoint_folds_history() {
        let test_store = TestStore::file();
        test_store.save(&account(1)).unwrap();
        for balance in 2..6 {
            let mut copy = test_store.find_by_id("Account", 0).unwrap().unwrap();
            copy.set("balance", balance);
            test_store.save(&copy).unwrap();
        }
        let path = test_store.path().unwrap();
        let before = read_records(&path, None, 0).unwrap();

        test_store.checkpoint().unwrap();
        let after = read_records(&path, None, 0).unwrap();
        assert!(after.len() < before.len());
        let commits = after.iter().filter(|r| r.record_type == "COMMIT").count();
        assert_eq!(commits, 1);
    }

    #[test]
    fn test_json_shape() {
        let info = describe(4, &LogRecord::Commit { batch: 2 });
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["record_type"], "COMMIT");
        assert_eq!(json["batch"], 2);
        assert!(json.get("handle").is_none());
    }
}
