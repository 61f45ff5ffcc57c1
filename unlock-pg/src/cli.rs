//! Command-line definition and resolution into core settings.
//!
//! Connection parameters come from five positional arguments, each falling
//! back to the matching libpq environment variable. Everything else is an
//! option whose default produces the standard `up_<name>.csv` layout.

use clap::{Args, Parser};
use std::path::PathBuf;
use std::str::FromStr;
use unlock_core::{
    ArchiveSelection, ArchiveSettings, Compression, ConnectionDescriptor, ExportSettings,
    QuoteMode, Result, SnapshotPlan, SslMode, UnlockError, default_jobs, load_jobs,
};
use unlock_core::archive::DEFAULT_CONTAINER_NAME;
use unlock_core::connection::{DEFAULT_APPLICATION_NAME, DEFAULT_PORT};
use unlock_core::export::DEFAULT_PREFIX;

/// CLI argument structure
#[derive(Parser)]
#[command(name = "unlock-pg")]
#[command(about = "PostgreSQL catalog snapshot tool")]
#[command(version)]
#[command(long_about = "
unlock-pg - PostgreSQL diagnostic snapshot

Runs a fixed list of catalog and statistics queries, writes each result to
<prefix>_<name>.csv, and packages the files into one compressed archive.

DEFAULT JOBS:
  class, database, index, namespace, settings, tables (SELECT * FROM pg_<name>)
  database_size, tables_size

CONNECTION:
  Positional arguments fall back to PGHOST, PGUSER, PGPASSWORD, PGDATABASE,
  and PGPORT. Passwords are never logged.

EXAMPLES:
  unlock-pg localhost postgres secret postgres 5432
  PGHOST=db.internal PGUSER=monitor unlock-pg --prompt-password
  unlock-pg --archive class,index --compression zstd -o ./snapshot
")]
pub struct Cli {
    /// Logging controls
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Connection parameters
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Export file options
    #[command(flatten)]
    pub export: ExportArgs,

    /// Archive options
    #[command(flatten)]
    pub archive: ArchiveArgs,
}

/// Verbosity flags shared by every invocation.
#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Where to connect and as whom.
#[derive(Args)]
pub struct ConnectionArgs {
    /// Server host
    #[arg(value_name = "HOST", env = "PGHOST", default_value = "localhost")]
    pub host: String,

    /// Login role
    #[arg(value_name = "USER", env = "PGUSER")]
    pub user: Option<String>,

    /// Login password
    #[arg(value_name = "PASSWORD", env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database to connect to
    #[arg(value_name = "DATABASE", env = "PGDATABASE")]
    pub database: Option<String>,

    /// Server port
    #[arg(value_name = "PORT", env = "PGPORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Application name reported to the server
    #[arg(long, env = "PGAPPNAME", default_value = DEFAULT_APPLICATION_NAME)]
    pub application_name: String,

    /// TLS mode
    #[arg(
        long,
        env = "PGSSLMODE",
        default_value = "disable",
        help = "TLS mode (disable, allow, prefer, require, verify-ca, verify-full)"
    )]
    pub sslmode: String,

    /// Prompt for the password when none was supplied
    #[arg(long, help = "Read the password from the terminal if none was given")]
    pub prompt_password: bool,
}

impl ConnectionArgs {
    /// Whether the password still has to be read from the terminal.
    pub fn needs_prompt(&self) -> bool {
        self.prompt_password && self.supplied_password().is_none()
    }

    fn supplied_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Builds a validated descriptor.
    ///
    /// `prompted` is used only when no password was supplied on the command
    /// line or in `PGPASSWORD`.
    ///
    /// # Errors
    /// Returns a configuration error if the user is missing, the TLS mode is
    /// unknown, or a field fails validation.
    pub fn descriptor(&self, prompted: Option<&str>) -> Result<ConnectionDescriptor> {
        let user = self
            .user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                UnlockError::configuration("a user is required (USER argument or PGUSER)")
            })?;

        let ssl_mode = SslMode::from_str(&self.sslmode).map_err(|_| {
            UnlockError::configuration(format!("unknown sslmode '{}'", self.sslmode))
        })?;

        let mut descriptor = ConnectionDescriptor::new(&self.host, user)
            .with_port(self.port)
            .with_application_name(&self.application_name)
            .with_ssl_mode(ssl_mode);

        if let Some(password) = self.supplied_password().or(prompted) {
            descriptor = descriptor.with_password(password);
        }
        if let Some(database) = &self.database {
            descriptor = descriptor.with_database(database);
        }

        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Export file options.
#[derive(Args)]
pub struct ExportArgs {
    /// Output directory
    #[arg(
        short,
        long,
        default_value = ".",
        help = "Directory receiving the exported files and the archive"
    )]
    pub output_dir: PathBuf,

    /// File name prefix
    #[arg(long, default_value = DEFAULT_PREFIX, help = "Exported file name prefix")]
    pub prefix: String,

    /// Job list file
    #[arg(
        long,
        value_name = "FILE",
        help = "JSON array of {\"name\", \"query\"} jobs replacing the default list"
    )]
    pub jobs: Option<PathBuf>,

    /// Quote every field
    #[arg(long, help = "Quote every field instead of only those that need it")]
    pub quote_all: bool,
}

/// Archive options.
#[derive(Args)]
pub struct ArchiveArgs {
    /// Jobs whose files are archived
    #[arg(
        long,
        value_name = "NAMES",
        value_delimiter = ',',
        conflicts_with = "no_archive",
        help = "Comma-separated job names to archive (default: all exported)"
    )]
    pub archive: Vec<String>,

    /// Skip archiving
    #[arg(long, help = "Export files only, build no archive")]
    pub no_archive: bool,

    /// Container file name
    #[arg(long, default_value = DEFAULT_CONTAINER_NAME, help = "Uncompressed tar file name")]
    pub container: String,

    /// Artifact file name
    #[arg(
        long,
        help = "Compressed archive file name (default: <container>.gz or .zst)"
    )]
    pub artifact: Option<String>,

    /// Compression codec
    #[arg(long, default_value = "gzip", help = "Compression codec (gzip, zstd)")]
    pub compression: String,

    /// Compression level
    #[arg(long, help = "Codec level (gzip 0-9, zstd 1-22)")]
    pub compression_level: Option<i32>,

    /// Remove the container after compression
    #[arg(long, help = "Delete the uncompressed tar file after compression")]
    pub remove_container: bool,
}

impl ArchiveArgs {
    /// Archive selection implied by the flags.
    pub fn selection(&self) -> ArchiveSelection {
        if self.no_archive {
            ArchiveSelection::Disabled
        } else if self.archive.is_empty() {
            ArchiveSelection::All
        } else {
            ArchiveSelection::Named(self.archive.clone())
        }
    }
}

impl Cli {
    /// Export settings for the output directory.
    pub fn export_settings(&self) -> ExportSettings {
        let quote_mode = if self.export.quote_all {
            QuoteMode::Always
        } else {
            QuoteMode::Necessary
        };
        ExportSettings::new(&self.export.output_dir)
            .with_prefix(&self.export.prefix)
            .with_quote_mode(quote_mode)
    }

    /// Validated archive settings.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown codec, an out-of-range
    /// level, or conflicting names.
    pub fn archive_settings(&self) -> Result<ArchiveSettings> {
        let compression = Compression::from_str(&self.archive.compression)?;

        let mut settings = ArchiveSettings::new(&self.export.output_dir)
            .with_container_name(&self.archive.container)
            .with_compression(compression)
            .with_keep_container(!self.archive.remove_container);
        if let Some(artifact) = &self.archive.artifact {
            settings = settings.with_artifact_name(artifact);
        }
        if let Some(level) = self.archive.compression_level {
            settings = settings.with_level(level);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Job list and archive selection.
    ///
    /// # Errors
    /// Returns a configuration error if the job file cannot be loaded or
    /// the selection names an unknown job.
    pub fn snapshot_plan(&self) -> Result<SnapshotPlan> {
        let jobs = match &self.export.jobs {
            Some(path) => load_jobs(path)?,
            None => default_jobs(),
        };
        SnapshotPlan::new(jobs, self.archive.selection())
    }
}
