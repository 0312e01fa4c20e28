//! Reference extraction pipeline
//!
//! Filters a vendor archive down to a set of entry prefixes, hands the
//! filtered archive to an external decompiler, and manages the output tree.
//! The vendor archive is only ever read. Nothing here feeds the main build.

use crate::error::{BuildError, BuildResult};
use crate::process;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::{ZipArchive, ZipWriter};

/// Marker written into the output directory after a successful decompile
pub const COMPLETE_MARKER: &str = ".complete";

/// External decompiler boundary
pub trait Decompiler: Send + Sync {
    /// Decompile `input` into `output`; the output directory is created by the caller
    fn decompile(&self, input: &Path, output: &Path) -> BuildResult<()>;
}

/// Decompiler run as a subprocess from a command template with
/// `{input}` and `{output}` placeholders
#[derive(Debug, Clone)]
pub struct ProcessDecompiler {
    command: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessDecompiler {
    pub fn new(command: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_dir: working_dir.into(),
        }
    }
}

impl Decompiler for ProcessDecompiler {
    fn decompile(&self, input: &Path, output: &Path) -> BuildResult<()> {
        let argv = process::expand(
            &self.command,
            &[
                ("input", input.display().to_string()),
                ("output", output.display().to_string()),
            ],
        );
        let result = process::run("decompiler", &argv, &self.working_dir)?;
        if !result.success() {
            return Err(BuildError::ExternalProcess {
                tool: "decompiler".to_string(),
                exit_code: result.exit_code,
                output: result.output(),
            });
        }
        Ok(())
    }
}

/// Result of the filter step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    pub path: PathBuf,
    pub kept: usize,
    pub dropped: usize,
}

/// Whether an entry name falls under one of the prefixes
fn selected(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Copy the entries of `vendor` whose names start with a prefix into `output`.
///
/// Entries are copied raw, so their compressed bytes and metadata are
/// identical to the source archive.
pub fn filter_archive(vendor: &Path, prefixes: &[String], output: &Path) -> BuildResult<FilterSummary> {
    let file = File::open(vendor).map_err(|e| BuildError::io(vendor, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| BuildError::archive(vendor, e))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    let out = File::create(output).map_err(|e| BuildError::io(output, e))?;
    let mut writer = ZipWriter::new(out);

    let mut kept = 0;
    let mut dropped = 0;
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| BuildError::archive(vendor, e))?;
        if selected(entry.name(), prefixes) {
            writer
                .raw_copy_file(entry)
                .map_err(|e| BuildError::archive(output, e))?;
            kept += 1;
        } else {
            dropped += 1;
        }
    }
    writer.finish().map_err(|e| BuildError::archive(output, e))?;

    info!(
        vendor = %vendor.display(),
        kept,
        dropped,
        "filtered vendor archive"
    );
    Ok(FilterSummary {
        path: output.to_path_buf(),
        kept,
        dropped,
    })
}

/// Where the pipeline reads and writes
#[derive(Debug, Clone)]
pub struct ReferencePipeline {
    pub vendor_archive: PathBuf,
    pub prefixes: Vec<String>,
    /// Directory holding the filtered archive
    pub work_dir: PathBuf,
    /// Decompiled output directory
    pub output_dir: PathBuf,
}

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub filtered: FilterSummary,
    pub output_dir: PathBuf,
}

impl ReferencePipeline {
    /// `<work>/<vendor-stem>-filtered.jar`
    pub fn filtered_path(&self) -> PathBuf {
        let stem = self
            .vendor_archive
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "vendor".to_string());
        self.work_dir.join(format!("{}-filtered.jar", stem))
    }

    /// Whether the output directory holds a complete decompile
    pub fn is_complete(&self) -> bool {
        self.output_dir.join(COMPLETE_MARKER).is_file()
    }

    /// Filter, then decompile into a fresh output directory.
    ///
    /// Any previous output is removed first. On decompiler failure the
    /// partial output is left in place for inspection and no completion
    /// marker is written.
    pub fn extract_and_decompile(&self, decompiler: &dyn Decompiler) -> BuildResult<ExtractionReport> {
        if !self.vendor_archive.is_file() {
            return Err(BuildError::io(
                &self.vendor_archive,
                std::io::Error::new(std::io::ErrorKind::NotFound, "vendor archive not found"),
            ));
        }

        self.clean()?;

        let filtered = filter_archive(&self.vendor_archive, &self.prefixes, &self.filtered_path())?;
        if filtered.kept == 0 {
            warn!(prefixes = ?self.prefixes, "no vendor entries matched the reference prefixes");
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| BuildError::io(&self.output_dir, e))?;

        info!(output = %self.output_dir.display(), "decompiling reference sources");
        decompiler.decompile(&filtered.path, &self.output_dir)?;

        let marker = self.output_dir.join(COMPLETE_MARKER);
        fs::write(&marker, b"").map_err(|e| BuildError::io(&marker, e))?;

        Ok(ExtractionReport {
            filtered,
            output_dir: self.output_dir.clone(),
        })
    }

    /// Recursively remove the output directory; returns whether anything was removed
    pub fn clean(&self) -> BuildResult<bool> {
        if !self.output_dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.output_dir).map_err(|e| BuildError::io(&self.output_dir, e))?;
        info!(output = %self.output_dir.display(), "removed decompiled reference");
        Ok(true)
    }
}
