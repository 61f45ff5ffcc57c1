//! Export job catalog.
//!
//! A job pairs an output name with the query whose result is written to
//! `<prefix>_<name>.csv`. The default catalog dumps six system catalogs and
//! two size statistics; operators can supply their own list as JSON.

use crate::{Result, error::UnlockError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// System catalogs dumped in full by the default job list.
pub const DEFAULT_CATALOGS: &[&str] = &[
    "class",
    "database",
    "index",
    "namespace",
    "settings",
    "tables",
];

const DATABASE_SIZE_QUERY: &str =
    "SELECT datname, pg_database_size(datname) AS datsize FROM pg_database";

const TABLES_SIZE_QUERY: &str = "WITH tt AS (\
     SELECT schemaname, tablename, schemaname::text || '.' || tablename::text AS tn \
     FROM pg_tables WHERE schemaname::text NOT IN ('pg_catalog')\
     ) \
     SELECT schemaname, tablename, pg_relation_size(tn), \
     pg_relation_size(tn, 'fsm') AS fsm, \
     pg_relation_size(tn, 'main') AS main, \
     pg_relation_size(tn, 'vm') AS vm \
     FROM tt";

/// One named query to export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportJob {
    /// Output name, embedded in the produced file name
    pub name: String,
    /// Trusted query text supplied by the operator
    pub query: String,
}

impl ExportJob {
    /// Creates a job from a name and query.
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Builds a job that dumps `pg_<relation>` in full.
pub fn catalog_job(relation: &str) -> ExportJob {
    ExportJob::new(relation, format!("SELECT * FROM pg_{}", relation))
}

/// The default job list: six catalog dumps followed by database and
/// table size statistics.
pub fn default_jobs() -> Vec<ExportJob> {
    let mut jobs: Vec<ExportJob> = DEFAULT_CATALOGS.iter().map(|r| catalog_job(r)).collect();
    jobs.push(ExportJob::new("database_size", DATABASE_SIZE_QUERY));
    jobs.push(ExportJob::new("tables_size", TABLES_SIZE_QUERY));
    jobs
}

/// Loads a job list from a JSON array of `{"name": .., "query": ..}` objects.
///
/// # Errors
/// Returns a configuration error if the file cannot be read, is not valid
/// JSON, or fails [`validate_jobs`].
pub fn load_jobs(path: &Path) -> Result<Vec<ExportJob>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        UnlockError::configuration(format!(
            "Failed to read job file {}: {}",
            path.display(),
            e
        ))
    })?;

    let jobs: Vec<ExportJob> = serde_json::from_str(&contents).map_err(|e| {
        UnlockError::configuration(format!(
            "Invalid job file {}: {}",
            path.display(),
            e
        ))
    })?;

    validate_jobs(&jobs)?;
    Ok(jobs)
}

/// Checks that a job name can be used as a file name component.
pub fn is_valid_job_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Validates a job list.
///
/// # Errors
/// Returns a configuration error if the list is empty, a name is invalid or
/// repeated, or a query is blank.
pub fn validate_jobs(jobs: &[ExportJob]) -> Result<()> {
    if jobs.is_empty() {
        return Err(UnlockError::configuration("job list is empty"));
    }

    let mut seen = HashSet::new();
    for job in jobs {
        if !is_valid_job_name(&job.name) {
            return Err(UnlockError::configuration(format!(
                "invalid job name '{}': use letters, digits, '_', '-' or '.'",
                job.name
            )));
        }
        if !seen.insert(job.name.as_str()) {
            return Err(UnlockError::configuration(format!(
                "duplicate job name '{}'",
                job.name
            )));
        }
        if job.query.trim().is_empty() {
            return Err(UnlockError::configuration(format!(
                "job '{}' has an empty query",
                job.name
            )));
        }
    }

    Ok(())
}
