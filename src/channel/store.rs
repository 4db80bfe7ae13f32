//! Durable storage for the latest accepted checkpoint.
//!
//! The ledger writes the record before it replaces its in-memory checkpoint,
//! so a crash can lose at most a transfer that was never acknowledged.

use crate::messages::CheckpointRecord;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("checkpoint record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait CheckpointStore: Send {
    /// The last record saved, `None` for a channel that never advanced.
    fn load(&self) -> Result<Option<CheckpointRecord>, StoreError>;

    /// Replace the stored record. Either the old or the new record must be
    /// readable afterwards, never a mix.
    fn save(&mut self, record: &CheckpointRecord) -> Result<(), StoreError>;
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Box<T> {
    fn load(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        (**self).load()
    }

    fn save(&mut self, record: &CheckpointRecord) -> Result<(), StoreError> {
        (**self).save(record)
    }
}

/// Keeps the checkpoint as a pretty-printed JSON file.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by the file at `path`. Missing parent
    /// directories are created.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CheckpointStore for FileStore {
    fn load(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        let val = match fs::read_to_string(&self.path) {
            Ok(val) => val,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&val)?))
    }

    fn save(&mut self, record: &CheckpointRecord) -> Result<(), StoreError> {
        let val = serde_json::to_string_pretty(record)?;
        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(val.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store, mostly for tests and short-lived sessions.
///
/// Clones share the same slot, so a test can keep a handle and inspect what
/// the ledger wrote or hand it to a second ledger to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<Option<CheckpointRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CheckpointRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(record))),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CheckpointRecord>> {
        // A panicking writer cannot leave a half-written Option behind.
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CheckpointStore for MemoryStore {
    fn load(&self) -> Result<Option<CheckpointRecord>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save(&mut self, record: &CheckpointRecord) -> Result<(), StoreError> {
        *self.slot() = Some(record.clone());
        Ok(())
    }
}
