//! Input fingerprints for up-to-date checks
//!
//! A fingerprint is a SHA-256 digest over a task's identity, a few scalar
//! inputs, and the content of its input trees. Fingerprints of successful
//! runs are persisted as JSON; a task is only considered up to date when the
//! stored value matches and all of its outputs still exist.

use crate::error::{BuildError, BuildResult};
use crate::tasks::TaskId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const STORE_VERSION: u32 = 1;

/// Compute SHA-256 of a file's bytes
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash every file under `root`, sorted by relative path.
///
/// A single file is hashed under an empty relative path; a missing root
/// yields no entries.
pub fn hash_tree(root: &Path) -> BuildResult<Vec<(String, String)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            BuildError::io(path, e.into())
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            files.push((relative, entry.into_path()));
        }
    }

    files
        .into_par_iter()
        .map(|(relative, path)| {
            let hash = hash_file(&path).map_err(|e| BuildError::io(&path, e))?;
            Ok((relative, hash))
        })
        .collect()
}

/// Builder for a task fingerprint
#[derive(Debug)]
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new(id: &TaskId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(id.to_string().as_bytes());
        Self { hasher }
    }

    /// Mix in a scalar input
    pub fn value(mut self, key: &str, value: &str) -> Self {
        self.hasher.update(b"\0v\0");
        self.hasher.update(key.as_bytes());
        self.hasher.update(b"=");
        self.hasher.update(value.as_bytes());
        self
    }

    /// Mix in the content of an input tree
    pub fn tree(mut self, key: &str, root: &Path) -> BuildResult<Self> {
        self.hasher.update(b"\0t\0");
        self.hasher.update(key.as_bytes());
        if !root.exists() {
            self.hasher.update(b"<absent>");
        }
        for (relative, hash) in hash_tree(root)? {
            self.hasher.update(relative.as_bytes());
            self.hasher.update(b":");
            self.hasher.update(hash.as_bytes());
            self.hasher.update(b"\n");
        }
        Ok(self)
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FingerprintStore {
    version: u32,
    entries: BTreeMap<String, String>,
}

/// Persistent fingerprints of successful task runs
#[derive(Debug)]
pub struct FingerprintCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    lookups_enabled: bool,
}

impl FingerprintCache {
    /// Load the store at `path`; a missing or unreadable store starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<FingerprintStore>(&content) {
                Ok(store) if store.version == STORE_VERSION => store.entries,
                Ok(_) => {
                    debug!(path = %path.display(), "fingerprint store version changed, starting fresh");
                    BTreeMap::new()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring corrupt fingerprint store");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries,
            lookups_enabled: true,
        }
    }

    /// Never report a task as up to date; successes are still recorded
    pub fn with_lookups(mut self, enabled: bool) -> Self {
        self.lookups_enabled = enabled;
        self
    }

    /// Whether a task can be skipped given its current fingerprint and outputs
    pub fn is_up_to_date(&self, id: &TaskId, fingerprint: &str, outputs: &[PathBuf]) -> bool {
        self.lookups_enabled
            && self.entries.get(&id.to_string()).map(String::as_str) == Some(fingerprint)
            && outputs.iter().all(|p| p.exists())
    }

    /// Remember the fingerprint of a successful run
    pub fn record(&mut self, id: &TaskId, fingerprint: String) {
        self.entries.insert(id.to_string(), fingerprint);
    }

    /// Forget a task, forcing it to re-execute next time
    pub fn invalidate(&mut self, id: &TaskId) {
        self.entries.remove(&id.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store back to disk
    pub fn save(&self) -> BuildResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        let store = FingerprintStore {
            version: STORE_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&store)
            .map_err(|e| BuildError::io(&self.path, std::io::Error::other(e)))?;
        fs::write(&self.path, json).map_err(|e| BuildError::io(&self.path, e))
    }
}
