//! Core export-and-archive pipeline for unlock.
//!
//! unlock takes a diagnostic snapshot of a PostgreSQL instance: it runs a
//! list of catalog and statistics queries, writes each result to a delimited
//! file, and packages the files into one compressed artifact for offline
//! transport.
//!
//! # Guarantees
//! - Credentials are never logged or included in error messages
//! - Each export holds its own connection and releases it on every exit path
//! - Jobs run strictly one after another
//!
//! # Architecture
//! - `export`: query → row stream → delimited file
//! - `archive`: files → tar container → compressed artifact
//! - `pipeline`: runs a job list through both with the failure policy

pub mod archive;
pub mod connection;
pub mod error;
pub mod export;
pub mod jobs;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use archive::{ArchiveReport, ArchiveSettings, Archiver, Compression};
pub use connection::{ConnectionDescriptor, SslMode};
pub use error::{Result, UnlockError};
pub use export::{ExportSettings, ExportSource, ExportedFile, Exporter, QuoteMode};
pub use jobs::{ExportJob, default_jobs, load_jobs};
pub use logging::init_logging;
pub use pipeline::{ArchiveSelection, SnapshotOutcome, SnapshotPlan, run_snapshot};
