//! Packaging exported files into a compressed artifact.
//!
//! Archiving runs in two passes. The first builds an uncompressed tar
//! container holding each input's name, size, mode, mtime, and bytes. The
//! second re-reads the finished container and compresses it as a single
//! stream into the artifact. Inputs that cannot be opened, stat'ed, or read
//! in full are skipped with a warning and the remaining inputs are still
//! archived.

pub mod compress;

pub use compress::{Compression, compress_file};

use crate::{Result, error::UnlockError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Container file name used when none is configured.
pub const DEFAULT_CONTAINER_NAME: &str = "unlock.tar";

/// Where the container and artifact are written and how.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Directory receiving the container and the artifact
    pub output_dir: PathBuf,
    /// Container file name
    pub container_name: String,
    /// Artifact file name; defaults to the container name plus the codec
    /// extension
    pub artifact_name: Option<String>,
    /// Artifact codec
    pub compression: Compression,
    /// Codec level; the codec default when unset
    pub level: Option<i32>,
    /// Keep the uncompressed container after compression
    pub keep_container: bool,
}

impl ArchiveSettings {
    /// gzip settings writing `unlock.tar` and `unlock.tar.gz` into
    /// `output_dir`, keeping the container.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            artifact_name: None,
            compression: Compression::Gzip,
            level: None,
            keep_container: true,
        }
    }

    /// Builder method to set the container name.
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    /// Builder method to set the artifact name.
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = Some(name.into());
        self
    }

    /// Builder method to set the codec.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Builder method to set the codec level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    /// Builder method to keep or remove the container.
    pub fn with_keep_container(mut self, keep: bool) -> Self {
        self.keep_container = keep;
        self
    }

    /// Path of the uncompressed container.
    pub fn container_path(&self) -> PathBuf {
        self.output_dir.join(&self.container_name)
    }

    /// Path of the compressed artifact.
    pub fn artifact_path(&self) -> PathBuf {
        match &self.artifact_name {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.join(format!(
                "{}.{}",
                self.container_name,
                self.compression.extension()
            )),
        }
    }

    /// Validates names and level.
    ///
    /// # Errors
    /// Returns a configuration error for empty names, an artifact that would
    /// overwrite the container, or an out-of-range level.
    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(UnlockError::configuration("container name cannot be empty"));
        }
        if self
            .artifact_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(UnlockError::configuration("artifact name cannot be empty"));
        }
        if self.artifact_path() == self.container_path() {
            return Err(UnlockError::configuration(
                "artifact and container must have different names",
            ));
        }
        if let Some(level) = self.level {
            self.compression.validate_level(level)?;
        }
        Ok(())
    }
}

/// One file stored in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    /// Entry name (the input's file name)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Modification time
    pub modified: DateTime<Utc>,
}

/// An input left out of the container.
#[derive(Debug)]
pub struct SkippedFile {
    /// Input path as given
    pub path: PathBuf,
    /// Why it was skipped
    pub error: UnlockError,
}

/// Outcome of one archive run.
#[derive(Debug)]
pub struct ArchiveReport {
    /// Uncompressed container path
    pub container: PathBuf,
    /// Compressed artifact path
    pub artifact: PathBuf,
    /// Stored entries, in input order
    pub entries: Vec<ArchivedEntry>,
    /// Inputs that were skipped, in input order
    pub skipped: Vec<SkippedFile>,
    /// Whether the container was deleted after compression
    pub container_removed: bool,
}

/// Builds the container and the compressed artifact.
#[derive(Debug, Clone)]
pub struct Archiver {
    settings: ArchiveSettings,
}

impl Archiver {
    /// Creates an archiver.
    pub fn new(settings: ArchiveSettings) -> Self {
        Self { settings }
    }

    /// Archive settings.
    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    /// Checks that neither the container nor the artifact would overwrite one
    /// of `files`.
    ///
    /// # Errors
    /// Returns a configuration error naming the first colliding input.
    pub fn check_inputs<P: AsRef<Path>>(&self, files: &[P]) -> Result<()> {
        let outputs = [
            resolve_path(&self.settings.container_path()),
            resolve_path(&self.settings.artifact_path()),
        ];
        for path in files {
            let path = path.as_ref();
            if outputs.contains(&resolve_path(path)) {
                return Err(UnlockError::configuration(format!(
                    "archive output would overwrite input {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Archives `files` in order and compresses the result.
    ///
    /// Missing, unreadable, or non-regular inputs are recorded in
    /// [`ArchiveReport::skipped`] and do not fail the call.
    ///
    /// # Errors
    /// Returns an error if the settings are invalid, an output path names one
    /// of `files`, the container cannot be written, or the compression pass
    /// fails.
    pub fn archive<P: AsRef<Path>>(&self, files: &[P]) -> Result<ArchiveReport> {
        self.settings.validate()?;
        self.check_inputs(files)?;

        let container = self.settings.container_path();
        let artifact = self.settings.artifact_path();

        let (entries, skipped) = build_container(&container, files)?;
        tracing::info!(
            "Tar file created: {} ({} entries, {} skipped)",
            container.display(),
            entries.len(),
            skipped.len()
        );

        let bytes = compress_file(
            &container,
            &artifact,
            self.settings.compression,
            self.settings.level,
        )?;
        tracing::info!(
            "Compressed {} bytes with {} into {}",
            bytes,
            self.settings.compression,
            artifact.display()
        );

        let container_removed = if self.settings.keep_container {
            false
        } else {
            match std::fs::remove_file(&container) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", container.display(), e);
                    false
                }
            }
        };

        Ok(ArchiveReport {
            container,
            artifact,
            entries,
            skipped,
            container_removed,
        })
    }
}

/// Writes the tar container, skipping inputs that cannot be opened.
fn build_container<P: AsRef<Path>>(
    container: &Path,
    files: &[P],
) -> Result<(Vec<ArchivedEntry>, Vec<SkippedFile>)> {
    let output = File::create(container).map_err(|e| {
        UnlockError::write_failed(format!("Failed to create {}", container.display()), e)
    })?;
    let mut builder = tar::Builder::new(output);

    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    let mut names = HashSet::new();

    for path in files {
        let path = path.as_ref();
        let (input, entry) = match open_input(path) {
            Ok(opened) => opened,
            Err(error) => {
                tracing::warn!("Skipping {}: {}", path.display(), error);
                skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    error,
                });
                continue;
            }
        };

        if let Some(error) = append_entry(&mut builder, container, input, &entry)? {
            tracing::warn!("Skipping {}: {}", path.display(), error);
            skipped.push(SkippedFile {
                path: path.to_path_buf(),
                error,
            });
            continue;
        }

        if !names.insert(entry.name.clone()) {
            tracing::warn!("Entry name '{}' appears more than once", entry.name);
        }
        tracing::debug!("Added {} ({} bytes)", entry.name, entry.size);
        entries.push(entry);
    }

    let mut output = builder.into_inner().map_err(|e| {
        UnlockError::write_failed(format!("Failed to finish {}", container.display()), e)
    })?;
    output.flush().map_err(|e| {
        UnlockError::write_failed(format!("Failed to flush {}", container.display()), e)
    })?;
    output.sync_all().map_err(|e| {
        UnlockError::write_failed(format!("Failed to sync {}", container.display()), e)
    })?;

    Ok((entries, skipped))
}

/// Opens an input and reads the metadata its header needs.
fn open_input(path: &Path) -> Result<(File, ArchivedEntry)> {
    let input = File::open(path).map_err(|e| {
        UnlockError::metadata(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let metadata = input.metadata().map_err(|e| {
        UnlockError::metadata(format!("Failed to stat {}: {}", path.display(), e))
    })?;

    if !metadata.is_file() {
        return Err(UnlockError::metadata(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            UnlockError::metadata(format!("{} has no usable file name", path.display()))
        })?
        .to_string();

    let modified = metadata.modified().map_err(|e| {
        UnlockError::metadata(format!(
            "Failed to read modification time of {}: {}",
            path.display(),
            e
        ))
    })?;

    let entry = ArchivedEntry {
        name,
        size: metadata.len(),
        mode: file_mode(&metadata),
        modified: DateTime::<Utc>::from(modified),
    };

    Ok((input, entry))
}

/// Appends a GNU header and exactly `entry.size` bytes of content.
///
/// Returns `Ok(Some(error))` when `input` fails or ends before `entry.size`
/// bytes; the partial entry is truncated off so the container stays valid.
fn append_entry<R: Read>(
    builder: &mut tar::Builder<File>,
    container: &Path,
    input: R,
    entry: &ArchivedEntry,
) -> Result<Option<UnlockError>> {
    let write_failed = |e: io::Error| {
        UnlockError::write_failed(
            format!(
                "Failed to append {} to {}",
                entry.name,
                container.display()
            ),
            e,
        )
    };

    let start = builder.get_mut().stream_position().map_err(write_failed)?;

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(entry.size);
    header.set_mode(entry.mode);
    header.set_mtime(u64::try_from(entry.modified.timestamp()).unwrap_or(0));

    let mut reader = SizedReader::new(input, entry.size);
    match builder.append_data(&mut header, &entry.name, &mut reader) {
        Ok(()) => Ok(None),
        Err(e) if reader.failed => {
            let output = builder.get_mut();
            output.set_len(start).map_err(write_failed)?;
            output.seek(SeekFrom::Start(start)).map_err(write_failed)?;
            Ok(Some(UnlockError::metadata(format!(
                "Failed to read {}: {}",
                entry.name, e
            ))))
        }
        Err(e) => Err(write_failed(e)),
    }
}

/// Yields exactly `remaining` bytes of `inner`, failing if it ends early.
struct SizedReader<R> {
    inner: R,
    remaining: u64,
    failed: bool,
}

impl<R> SizedReader<R> {
    const fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            failed: false,
        }
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let limit = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));

        match self.inner.read(&mut buf[..limit]) {
            Ok(0) => {
                self.failed = true;
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "input ended {} bytes short of its recorded size",
                        self.remaining
                    ),
                ))
            }
            Ok(read) => {
                self.remaining -= read as u64;
                Ok(read)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

/// Absolute form of `path` with its directory resolved, for comparing paths
/// that may not exist yet.
fn resolve_path(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
