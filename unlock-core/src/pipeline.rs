//! Sequential snapshot run: export every job, then archive a selection.
//!
//! Jobs run one after another. A query failure stops the run; any other
//! failure is logged, recorded, and the next job starts. Only files written
//! during this run are archived, so a re-run never picks up stale output.
//! A failed archive step is recorded the same way and does not discard the
//! exported files.

use crate::archive::{ArchiveReport, Archiver};
use crate::export::{ExportSource, ExportedFile};
use crate::jobs::{ExportJob, validate_jobs};
use crate::{Result, error::UnlockError};
use std::path::PathBuf;

/// Which exported files go into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArchiveSelection {
    /// Every file exported in this run
    #[default]
    All,
    /// Files of the named jobs, in the given order
    Named(Vec<String>),
    /// No archive is built
    Disabled,
}

/// Jobs to run and the archive selection.
#[derive(Debug, Clone)]
pub struct SnapshotPlan {
    jobs: Vec<ExportJob>,
    selection: ArchiveSelection,
}

impl SnapshotPlan {
    /// Creates a validated plan.
    ///
    /// # Errors
    /// Returns a configuration error if the job list is invalid or a named
    /// selection refers to an unknown job.
    pub fn new(jobs: Vec<ExportJob>, selection: ArchiveSelection) -> Result<Self> {
        validate_jobs(&jobs)?;

        if let ArchiveSelection::Named(names) = &selection {
            if names.is_empty() {
                return Err(UnlockError::configuration(
                    "archive selection names no jobs",
                ));
            }
            if let Some(unknown) = names.iter().find(|n| !jobs.iter().any(|j| &j.name == *n)) {
                return Err(UnlockError::configuration(format!(
                    "archive selection names unknown job '{}'",
                    unknown
                )));
            }
        }

        Ok(Self { jobs, selection })
    }

    /// Jobs in run order.
    pub fn jobs(&self) -> &[ExportJob] {
        &self.jobs
    }

    /// Archive selection.
    pub fn selection(&self) -> &ArchiveSelection {
        &self.selection
    }
}

/// A job that did not produce a file.
#[derive(Debug)]
pub struct FailedJob {
    /// Job name
    pub name: String,
    /// Why it failed
    pub error: UnlockError,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct SnapshotOutcome {
    /// Files produced, in job order
    pub exported: Vec<ExportedFile>,
    /// Jobs that failed without stopping the run
    pub failed: Vec<FailedJob>,
    /// Archive report, unless archiving was disabled or failed
    pub archive: Option<ArchiveReport>,
    /// Why the archive step failed, if it did
    pub archive_error: Option<UnlockError>,
}

impl SnapshotOutcome {
    /// Whether every job and every archive input succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
            && self.archive_error.is_none()
            && self
                .archive
                .as_ref()
                .is_none_or(|report| report.skipped.is_empty())
    }
}

/// Runs every job in order, then archives the selected files.
///
/// # Errors
/// Returns a configuration error if the archive settings are invalid or an
/// archive output would overwrite a job's file (both checked before any job
/// runs), or the first fatal (query) error.
pub async fn run_snapshot<S>(
    source: &S,
    archiver: &Archiver,
    plan: &SnapshotPlan,
) -> Result<SnapshotOutcome>
where
    S: ExportSource + ?Sized,
{
    if plan.selection() != &ArchiveSelection::Disabled {
        archiver.settings().validate()?;
        let planned: Vec<PathBuf> = plan
            .jobs()
            .iter()
            .map(|job| source.output_path(&job.name))
            .collect();
        archiver.check_inputs(&planned)?;
    }

    let mut exported = Vec::new();
    let mut failed = Vec::new();

    for job in plan.jobs() {
        tracing::debug!("Exporting '{}'", job.name);
        match source.export(job).await {
            Ok(file) => exported.push(file),
            Err(error) if error.is_fatal() => {
                tracing::error!("Export of '{}' failed: {}", job.name, error);
                return Err(error);
            }
            Err(error) => {
                tracing::error!("Export of '{}' failed: {}", job.name, error);
                failed.push(FailedJob {
                    name: job.name.clone(),
                    error,
                });
            }
        }
    }

    let (archive, archive_error) = match plan.selection() {
        ArchiveSelection::Disabled => (None, None),
        selection => {
            let files = select_files(selection, &exported);
            match archiver.archive(&files) {
                Ok(report) => (Some(report), None),
                Err(error) => {
                    tracing::error!("Archive step failed: {}", error);
                    (None, Some(error))
                }
            }
        }
    };

    Ok(SnapshotOutcome {
        exported,
        failed,
        archive,
        archive_error,
    })
}

/// Paths to archive for a selection, restricted to files exported this run.
fn select_files(selection: &ArchiveSelection, exported: &[ExportedFile]) -> Vec<PathBuf> {
    match selection {
        ArchiveSelection::All => exported.iter().map(|f| f.path.clone()).collect(),
        ArchiveSelection::Named(names) => names
            .iter()
            .filter_map(|name| {
                let file = exported.iter().find(|f| &f.name == name);
                if file.is_none() {
                    tracing::warn!("'{}' was not exported in this run and is not archived", name);
                }
                file.map(|f| f.path.clone())
            })
            .collect(),
        ArchiveSelection::Disabled => Vec::new(),
    }
}
