//! Durable record of per-chunk correction results, keyed by chunk hash.
//!
//! Writes are whole-value and keyed, so concurrent workers need no ordering
//! beyond an atomic write per key.

use crate::{error::ReconstructError, util::now_rfc3339};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Corrected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub hash: String,
    pub status: ResultStatus,
    /// Accepted correction; empty for failures.
    pub text: String,
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<ReconstructError>,
    pub recorded_at: String,
}

impl CorrectionResult {
    pub fn corrected(hash: &str, text: String, attempts: u32) -> Self {
        Self {
            hash: hash.to_string(),
            status: ResultStatus::Corrected,
            text,
            attempts,
            error: None,
            recorded_at: now_rfc3339(),
        }
    }

    pub fn failed(hash: &str, error: ReconstructError, attempts: u32) -> Self {
        Self {
            hash: hash.to_string(),
            status: ResultStatus::Failed,
            text: String::new(),
            attempts,
            error: Some(error),
            recorded_at: now_rfc3339(),
        }
    }

    pub fn is_corrected(&self) -> bool {
        self.status == ResultStatus::Corrected
    }
}

pub trait CheckpointStore: Send + Sync {
    fn get(&self, hash: &str) -> Result<Option<CorrectionResult>, ReconstructError>;
    fn put(&self, result: &CorrectionResult) -> Result<(), ReconstructError>;
    /// Whether entries survive the process.
    fn is_durable(&self) -> bool;
}

/// One JSON file per hash under a directory.
pub struct FileCheckpointStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileCheckpointStore {
    pub fn open(dir: &Path) -> Result<Self, ReconstructError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            ReconstructError::CheckpointIo(format!("create {}: {e}", dir.display()))
        })?;
        let probe = dir.join(".write-probe");
        std::fs::write(&probe, b"ok").map_err(|e| {
            ReconstructError::CheckpointIo(format!("{} is not writable: {e}", dir.display()))
        })?;
        let _ = std::fs::remove_file(&probe);
        Ok(Self {
            dir: dir.to_path_buf(),
            seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, hash: &str) -> Result<PathBuf, ReconstructError> {
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ReconstructError::CheckpointIo(format!(
                "invalid checkpoint key: {hash:?}"
            )));
        }
        Ok(self.dir.join(format!("{hash}.json")))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, hash: &str) -> Result<Option<CorrectionResult>, ReconstructError> {
        let path = self.path_for(hash)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ReconstructError::CheckpointIo(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };
        let result: CorrectionResult = serde_json::from_str(&raw).map_err(|e| {
            ReconstructError::CheckpointIo(format!("corrupt checkpoint {}: {e}", path.display()))
        })?;
        if result.hash != hash {
            warn!("checkpoint {} answers {}; ignoring", path.display(), result.hash);
            return Ok(None);
        }
        Ok(Some(result))
    }

    fn put(&self, result: &CorrectionResult) -> Result<(), ReconstructError> {
        let path = self.path_for(&result.hash)?;
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.{n}.tmp", result.hash, std::process::id()));
        let raw = serde_json::to_vec_pretty(result)
            .map_err(|e| ReconstructError::CheckpointIo(format!("encode checkpoint: {e}")))?;
        std::fs::write(&tmp, raw)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(hash = %result.hash, status = ?result.status, "checkpoint written");
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

/// Process-local store; used when no durable location is usable.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<String, CorrectionResult>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, hash: &str) -> Result<Option<CorrectionResult>, ReconstructError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ReconstructError::CheckpointIo("checkpoint map poisoned".into()))?;
        Ok(entries.get(hash).cloned())
    }

    fn put(&self, result: &CorrectionResult) -> Result<(), ReconstructError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ReconstructError::CheckpointIo("checkpoint map poisoned".into()))?;
        entries.insert(result.hash.clone(), result.clone());
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}

/// Opens the durable store at `dir`, or falls back to memory and returns the
/// reason resume is unavailable.
pub fn open_or_fallback(dir: &Path) -> (Box<dyn CheckpointStore>, Option<ReconstructError>) {
    match FileCheckpointStore::open(dir) {
        Ok(store) => (Box::new(store), None),
        Err(err) => {
            warn!("{err}; continuing without resume capability");
            (Box::new(MemoryCheckpointStore::new()), Some(err))
        }
    }
}
