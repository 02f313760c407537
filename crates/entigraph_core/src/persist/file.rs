//! Append-only log file persister.

use super::record::{scan_log, write_records, write_sealed, LogScan, LOG_MAGIC};
use super::{ChangeSet, Persister, Snapshot};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Persists batches to a single log file.
///
/// # Layout
///
/// ```text
/// <name>         # the log: magic, then CRC-framed records
/// <name>.lock    # advisory lock for single-process access
/// <name>.tmp     # checkpoint in progress
/// ```
///
/// Opening truncates anything past the last committed batch. Checkpoints
/// write a sealed snapshot to the temporary file and rename it over the log.
#[derive(Debug)]
pub struct FilePersister {
    path: PathBuf,
    file: Mutex<File>,
    _lock_file: File,
    sync: bool,
    batches: AtomicU64,
}

impl FilePersister {
    /// Opens or creates the log at `path`.
    ///
    /// # Errors
    ///
    /// `StoreLocked` if another process holds the log, `Persistence` if the
    /// log is missing and `create_if_missing` is off or the file is not a
    /// log, and I/O errors.
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        if !path.exists() && !config.create_if_missing {
            return Err(CoreError::persistence(format!(
                "log file does not exist: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, ".lock"))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let scan = scan_log(&bytes)?;
        if bytes.is_empty() {
            file.write_all(&LOG_MAGIC)?;
            file.sync_all()?;
        } else if scan.needs_repair() {
            warn!(
                path = %path.display(),
                dropped = scan.total_bytes - scan.committed_len,
                uncommitted = scan.uncommitted,
                "truncating log past last commit"
            );
            file.set_len(scan.committed_len)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), batches = scan.batches, "opened log");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            _lock_file: lock_file,
            sync: config.sync_on_persist,
            batches: AtomicU64::new(scan.batches),
        })
    }

    /// The log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scans a log without opening it for writing.
    ///
    /// # Errors
    ///
    /// I/O errors, or `Persistence` if the file is not a log.
    pub fn scan(path: &Path) -> CoreResult<LogScan> {
        scan_log(&fs::read(path)?)
    }

    fn read_all(file: &mut File) -> CoreResult<Vec<u8>> {
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl Persister for FilePersister {
    fn persist(&self, changes: &ChangeSet) -> CoreResult<()> {
        let batch = self.batches.load(Ordering::SeqCst) + 1;
        let mut encoded = Vec::new();
        write_records(&changes.to_records(batch), &mut encoded)?;

        let mut file = self.file.lock();
        let start = file.seek(SeekFrom::End(0))?;
        let mut written = file.write_all(&encoded);
        if written.is_ok() && self.sync {
            written = file.sync_data();
        }
        if let Err(err) = written {
            // A partial batch would replay as a torn tail anyway; cut it now.
            if let Err(truncate) = file.set_len(start) {
                warn!(error = %truncate, "could not cut partial batch");
            }
            return Err(err.into());
        }

        self.batches.store(batch, Ordering::SeqCst);
        debug!(batch, bytes = encoded.len(), "appended batch");
        Ok(())
    }

    fn load(&self) -> CoreResult<Option<Snapshot>> {
        let bytes = Self::read_all(&mut self.file.lock())?;
        let scan = scan_log(&bytes)?;
        if scan.records.is_empty() {
            return Ok(None);
        }
        Ok(Some(Snapshot::replay(scan.records)))
    }

    fn checkpoint(&self, full: &ChangeSet) -> CoreResult<()> {
        let batch = self.batches.load(Ordering::SeqCst).max(1);
        let mut image = LOG_MAGIC.to_vec();
        write_sealed(&full.to_records(batch), &mut image)?;

        // held from temp file to reopen; checkpoints share one temp path
        let mut file = self.file.lock();
        let temp = sibling(&self.path, ".tmp");
        {
            let mut out = File::create(&temp)?;
            out.write_all(&image)?;
            out.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.batches.store(batch, Ordering::SeqCst);
        info!(path = %self.path.display(), bytes = image.len(), "checkpointed log");
        Ok(())
    }

    fn batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }
}
