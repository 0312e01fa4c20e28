//! Reproducible archive assembly
//!
//! A package is built from ordered layers: the module's own classes, its own
//! resources, then the classes and resources of each inlined dependency in
//! dependency order. The first layer to provide an entry name wins. Entries
//! are written sorted by name with a fixed timestamp and permissions, so the
//! same inputs always produce the same bytes.

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Permissions recorded for every entry
const ENTRY_MODE: u32 = 0o644;

/// One ordered input of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Where the entries come from, for duplicate diagnostics
    pub origin: String,
    pub source: LayerSource,
    /// Entry name prefix, empty or ending in `/`
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    /// Every file under a directory, named by relative path
    Tree(PathBuf),
    /// A single file, named by its file name
    File(PathBuf),
}

impl Layer {
    pub fn tree(origin: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            source: LayerSource::Tree(root.into()),
            prefix: String::new(),
        }
    }

    pub fn file(origin: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            source: LayerSource::File(path.into()),
            prefix: String::new(),
        }
    }

    /// Place the layer's entries under a directory inside the archive
    pub fn under(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        self
    }
}

/// What went into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: usize,
    /// Entry names skipped because an earlier layer provided them
    pub duplicates: Vec<String>,
}

/// Resolve layers into a sorted entry table, first layer wins
fn collect_entries(layers: &[Layer]) -> BuildResult<(BTreeMap<String, PathBuf>, Vec<String>)> {
    let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let mut duplicates = Vec::new();

    for layer in layers {
        let mut files = Vec::new();
        match &layer.source {
            LayerSource::Tree(root) => {
                if !root.is_dir() {
                    continue;
                }
                for entry in WalkDir::new(root).sort_by_file_name() {
                    let entry = entry.map_err(|e| {
                        let path = e.path().unwrap_or(root).to_path_buf();
                        BuildError::io(path, e.into())
                    })?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(root)
                        .unwrap_or(entry.path())
                        .to_string_lossy()
                        .replace('\\', "/");
                    files.push((relative, entry.into_path()));
                }
            }
            LayerSource::File(path) => {
                let name = path
                    .file_name()
                    .ok_or_else(|| {
                        let error = io::Error::new(io::ErrorKind::InvalidInput, "no file name");
                        BuildError::io(path, error)
                    })?
                    .to_string_lossy()
                    .to_string();
                files.push((name, path.clone()));
            }
        }

        for (relative, path) in files {
            let name = format!("{}{}", layer.prefix, relative);
            if let Some(owner) = owners.get(&name) {
                debug!(entry = %name, kept = %owner, skipped = %layer.origin, "duplicate archive entry");
                duplicates.push(name);
                continue;
            }
            owners.insert(name.clone(), &layer.origin);
            entries.insert(name, path);
        }
    }

    Ok((entries, duplicates))
}

/// Write a reproducible zip archive from ordered layers.
///
/// The archive is assembled next to `output` and moved into place, so a
/// failed write never leaves a truncated file at the final path.
pub fn write_archive(output: &Path, layers: &[Layer]) -> BuildResult<ArchiveSummary> {
    let (entries, duplicates) = collect_entries(layers)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    let partial = output.with_extension("partial");
    let file = File::create(&partial).map_err(|e| BuildError::io(&partial, e))?;

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_MODE);

    let mut zip = ZipWriter::new(file);
    for (name, path) in &entries {
        zip.start_file(name.as_str(), options)
            .map_err(|e| BuildError::archive(output, e))?;
        let mut source = File::open(path).map_err(|e| BuildError::io(path, e))?;
        io::copy(&mut source, &mut zip).map_err(|e| BuildError::io(output, e))?;
    }
    let mut file = zip.finish().map_err(|e| BuildError::archive(output, e))?;
    file.flush().map_err(|e| BuildError::io(&partial, e))?;
    drop(file);

    fs::rename(&partial, output).map_err(|e| BuildError::io(output, e))?;

    info!(
        archive = %output.display(),
        entries = entries.len(),
        duplicates = duplicates.len(),
        "wrote archive"
    );

    Ok(ArchiveSummary {
        path: output.to_path_buf(),
        entries: entries.len(),
        duplicates,
    })
}

/// Inputs of a self-contained plugin artifact
#[derive(Debug, Clone)]
pub struct PackageInputs {
    pub module: String,
    pub classes: PathBuf,
    pub resources: PathBuf,
    /// (module path, classes dir, resources dir) in dependency order
    pub dependencies: Vec<(String, PathBuf, PathBuf)>,
}

impl PackageInputs {
    /// Layers in first-wins order
    pub fn layers(&self) -> Vec<Layer> {
        let mut layers = vec![
            Layer::tree(format!("{} classes", self.module), &self.classes),
            Layer::tree(format!("{} resources", self.module), &self.resources),
        ];
        for (module, classes, resources) in &self.dependencies {
            layers.push(Layer::tree(format!("{} classes", module), classes));
            layers.push(Layer::tree(format!("{} resources", module), resources));
        }
        layers
    }
}

/// Build one plugin artifact with every main-scope dependency inlined
pub fn package(output: &Path, inputs: &PackageInputs) -> BuildResult<ArchiveSummary> {
    if !inputs.classes.is_dir() {
        return Err(BuildError::packaging(
            &inputs.module,
            format!("no compiled classes at {}", inputs.classes.display()),
        ));
    }
    write_archive(output, &inputs.layers())
}

/// Bundle plugin artifacts at the archive root
pub fn bundle_plugin_jars(output: &Path, artifacts: &[PathBuf]) -> BuildResult<ArchiveSummary> {
    let layers: Vec<Layer> = artifacts
        .iter()
        .map(|a| Layer::file(a.display().to_string(), a))
        .collect();
    write_archive(output, &layers)
}

/// Bundle plugin artifacts under `mods/` with the config tree beside them
pub fn bundle_mods_release(
    output: &Path,
    artifacts: &[PathBuf],
    config_source: Option<&Path>,
    config_subdir: &Path,
) -> BuildResult<ArchiveSummary> {
    let mut layers: Vec<Layer> = artifacts
        .iter()
        .map(|a| Layer::file(a.display().to_string(), a).under("mods"))
        .collect();
    if let Some(config) = config_source {
        let prefix = format!("mods/{}", config_subdir.to_string_lossy().replace('\\', "/"));
        layers.push(Layer::tree("config", config).under(&prefix));
    }
    write_archive(output, &layers)
}
