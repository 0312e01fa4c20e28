//! Deployment into the runtime's extension directory
//!
//! The extension directory is shared with files the orchestrator does not
//! own. Deletion is strictly allow-listed by file name pattern; everything
//! else survives. A deploy always runs clean, then config sync, then copy.

use crate::error::{BuildError, BuildResult};
use runetale_config::{is_confined_subdir, ConfigError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File name patterns the orchestrator may delete
#[derive(Debug, Clone, Default)]
pub struct OwnedPatterns {
    patterns: Vec<glob::Pattern>,
}

impl OwnedPatterns {
    pub fn new<I, S>(patterns: I) -> BuildResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                glob::Pattern::new(p.as_ref()).map_err(|e| {
                    BuildError::Config(ConfigError::InvalidValue {
                        field: "deploy pattern".to_string(),
                        reason: format!("'{}': {}", p.as_ref(), e),
                    })
                })
            })
            .collect::<BuildResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether a file name belongs to the orchestrator
    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(file_name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// What a deploy or clean changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Owned files deleted from the target directory
    pub removed: Vec<PathBuf>,
    /// Config files written by the mirror
    pub mirrored: Vec<PathBuf>,
    /// Files and directories removed by the mirror
    pub pruned: Vec<PathBuf>,
    /// Artifacts copied into the target directory
    pub copied: Vec<PathBuf>,
}

/// Deployment target: an extension directory plus the config subtree inside it
#[derive(Debug, Clone)]
pub struct DeploymentSync {
    target: PathBuf,
    config_subdir: PathBuf,
}

impl DeploymentSync {
    pub fn new(target: impl Into<PathBuf>, config_subdir: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            config_subdir: config_subdir.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Directory receiving the config mirror
    pub fn config_dir(&self) -> PathBuf {
        self.target.join(&self.config_subdir)
    }

    /// Reject a config subdirectory that would make the mirror prune
    /// outside its own subtree
    pub fn check_config_subdir(&self) -> BuildResult<()> {
        if is_confined_subdir(&self.config_subdir) {
            return Ok(());
        }
        Err(BuildError::Config(ConfigError::InvalidValue {
            field: "deploy.config_subdir".to_string(),
            reason: format!(
                "'{}' does not resolve inside {}",
                self.config_subdir.display(),
                self.target.display()
            ),
        }))
    }

    /// Delete top-level files of the target matching an owned pattern.
    ///
    /// Directories and non-matching files are never touched. A missing
    /// target directory has nothing to clean.
    pub fn clean(&self, owned: &OwnedPatterns) -> BuildResult<Vec<PathBuf>> {
        if !self.target.is_dir() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        let entries =
            fs::read_dir(&self.target).map_err(|e| BuildError::deployment(&self.target, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BuildError::deployment(&self.target, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| BuildError::deployment(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if owned.matches(&name) {
                candidates.push(entry.path());
            } else {
                debug!(file = %name, "leaving foreign file");
            }
        }
        candidates.sort();

        for path in &candidates {
            info!(file = %path.display(), "removing deployed file");
            fs::remove_file(path).map_err(|e| BuildError::deployment(path, e))?;
        }
        Ok(candidates)
    }

    /// Make the config subdirectory an exact copy of `source`.
    ///
    /// Returns (written, pruned). Files whose content already matches are
    /// not rewritten.
    ///
    /// Fails without touching the target when the config subdirectory
    /// does not resolve strictly inside it.
    pub fn sync_config(&self, source: &Path) -> BuildResult<(Vec<PathBuf>, Vec<PathBuf>)> {
        self.check_config_subdir()?;
        let dest = self.config_dir();
        if !source.is_dir() {
            warn!(source = %source.display(), "config source missing, skipping mirror");
            return Ok((Vec::new(), Vec::new()));
        }

        let mut expected: BTreeSet<PathBuf> = BTreeSet::new();
        let mut written = Vec::new();
        fs::create_dir_all(&dest).map_err(|e| BuildError::deployment(&dest, e))?;

        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                BuildError::deployment(path, e.into())
            })?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = dest.join(relative);
            expected.insert(relative.to_path_buf());

            if entry.file_type().is_dir() {
                if target.is_file() {
                    fs::remove_file(&target).map_err(|e| BuildError::deployment(&target, e))?;
                }
                fs::create_dir_all(&target).map_err(|e| BuildError::deployment(&target, e))?;
            } else if entry.file_type().is_file() {
                if target.is_dir() {
                    fs::remove_dir_all(&target)
                        .map_err(|e| BuildError::deployment(&target, e))?;
                }
                let fresh = fs::read(entry.path())
                    .map_err(|e| BuildError::deployment(entry.path(), e))?;
                let unchanged = fs::read(&target).map(|old| old == fresh).unwrap_or(false);
                if !unchanged {
                    fs::write(&target, &fresh).map_err(|e| BuildError::deployment(&target, e))?;
                    written.push(target);
                }
            }
        }

        let mut pruned = Vec::new();
        for entry in WalkDir::new(&dest).min_depth(1).contents_first(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dest).to_path_buf();
                BuildError::deployment(path, e.into())
            })?;
            let relative = entry.path().strip_prefix(&dest).unwrap_or(entry.path());
            if expected.contains(relative) {
                continue;
            }
            let path = entry.path().to_path_buf();
            if entry.file_type().is_dir() {
                fs::remove_dir(&path).map_err(|e| BuildError::deployment(&path, e))?;
            } else {
                fs::remove_file(&path).map_err(|e| BuildError::deployment(&path, e))?;
            }
            debug!(path = %path.display(), "pruned stale config entry");
            pruned.push(path);
        }
        pruned.sort();

        info!(
            dest = %dest.display(),
            written = written.len(),
            pruned = pruned.len(),
            "config mirrored"
        );
        Ok((written, pruned))
    }

    /// Copy artifacts into the target directory
    pub fn copy_artifacts(&self, artifacts: &[PathBuf]) -> BuildResult<Vec<PathBuf>> {
        fs::create_dir_all(&self.target).map_err(|e| BuildError::deployment(&self.target, e))?;

        let mut copied = Vec::new();
        for artifact in artifacts {
            let name = artifact.file_name().ok_or_else(|| {
                BuildError::deployment(
                    artifact,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact has no file name"),
                )
            })?;
            let dest = self.target.join(name);
            fs::copy(artifact, &dest).map_err(|e| BuildError::deployment(artifact, e))?;
            info!(artifact = %dest.display(), "deployed");
            copied.push(dest);
        }
        Ok(copied)
    }

    /// Clean owned files, mirror config, then copy fresh artifacts.
    ///
    /// A failure after the clean step does not restore removed files.
    pub fn deploy(
        &self,
        owned: &OwnedPatterns,
        artifacts: &[PathBuf],
        config_source: Option<&Path>,
    ) -> BuildResult<DeployReport> {
        self.check_config_subdir()?;
        fs::create_dir_all(&self.target).map_err(|e| BuildError::deployment(&self.target, e))?;

        let removed = self.clean(owned)?;
        let (mirrored, pruned) = match config_source {
            Some(source) => self.sync_config(source)?,
            None => (Vec::new(), Vec::new()),
        };
        let copied = self.copy_artifacts(artifacts)?;

        Ok(DeployReport {
            removed,
            mirrored,
            pruned,
            copied,
        })
    }
}
