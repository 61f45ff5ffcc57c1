//! Query export to delimited files.
//!
//! An export opens one connection, prepares the query to learn its columns,
//! streams the result row by row in the server's text format, and writes a
//! header record followed by one record per row. The connection is closed
//! on every exit path.
//!
//! # Module Structure
//! - `render`: per-kind text conversion of values
//! - `writer`: the `csv`-backed file writer

pub mod render;
pub mod writer;

pub use render::{ValueKind, render_value};
pub use writer::DelimitedWriter;

use crate::connection::ConnectionDescriptor;
use crate::jobs::ExportJob;
use crate::{Result, error::UnlockError};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use sqlx::postgres::{PgColumn, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default file name prefix for exported files.
pub const DEFAULT_PREFIX: &str = "up";

/// Default file extension for exported files.
pub const DEFAULT_EXTENSION: &str = "csv";

/// Field enclosure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteMode {
    /// Quote only fields holding the delimiter, a quote, CR, or LF
    #[default]
    Necessary,
    /// Quote every field
    Always,
}

/// Where and how exported files are written.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Directory receiving the files
    pub output_dir: PathBuf,
    /// File name prefix, joined to the job name with `_`
    pub prefix: String,
    /// File extension without the dot
    pub extension: String,
    /// Field delimiter byte
    pub delimiter: u8,
    /// Field enclosure policy
    pub quote_mode: QuoteMode,
}

impl ExportSettings {
    /// Settings with the default prefix, `.csv` extension, and comma
    /// delimiter.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            delimiter: b',',
            quote_mode: QuoteMode::Necessary,
        }
    }

    /// Builder method to set the file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Builder method to set the delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Builder method to set the quote mode.
    pub fn with_quote_mode(mut self, quote_mode: QuoteMode) -> Self {
        self.quote_mode = quote_mode;
        self
    }

    /// File name for a job, e.g. `up_class.csv`.
    pub fn file_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}.{}", name, self.extension)
        } else {
            format!("{}_{}.{}", self.prefix, name, self.extension)
        }
    }

    /// Full output path for a job.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(self.file_name(name))
    }
}

/// Name and rendering class of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name from the result metadata
    pub name: String,
    /// Server type name
    pub type_name: String,
    /// Rendering class
    pub kind: ValueKind,
}

impl ColumnSpec {
    /// Creates a column spec from a server type name.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            kind: ValueKind::from_type_name(&type_name),
            type_name,
        }
    }

    fn from_column(column: &PgColumn) -> Self {
        Self::new(column.name(), column.type_info().name())
    }
}

/// A file produced by one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Job name
    pub name: String,
    /// Path of the written file
    pub path: PathBuf,
    /// Header fields, in projection order
    pub columns: Vec<String>,
    /// Number of data records written
    pub rows: u64,
}

/// Raw values of one result row, aligned with the columns.
pub type RawRow = Vec<Option<String>>;

/// Rejects results whose column names repeat.
///
/// # Errors
/// Returns `UnlockError::Metadata` naming the first repeated column.
pub fn ensure_unique_columns(job: &str, columns: &[ColumnSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(UnlockError::metadata(format!(
                "duplicate column name '{}' in result for '{}'",
                column.name, job
            )));
        }
    }
    Ok(())
}

/// Writes a header and every row of `rows` to `path`.
///
/// Rows are consumed one at a time. The first error stops the write and is
/// returned; records already written stay in the file.
///
/// # Errors
/// Propagates stream errors, `UnlockError::Metadata` for rows whose width
/// differs from `columns`, and `UnlockError::Write` on I/O failure.
pub async fn write_rows<S>(
    path: &Path,
    settings: &ExportSettings,
    columns: &[ColumnSpec],
    rows: S,
) -> Result<u64>
where
    S: Stream<Item = Result<RawRow>>,
{
    let header: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut writer = DelimitedWriter::create(path, settings, &header)?;

    let mut rows = std::pin::pin!(rows);
    while let Some(raw) = rows.next().await {
        let raw = raw?;
        if raw.len() != columns.len() {
            return Err(UnlockError::metadata(format!(
                "row {} of {} has {} values, result has {} columns",
                writer.rows().saturating_add(1),
                path.display(),
                raw.len(),
                columns.len()
            )));
        }

        let rendered: Vec<_> = columns
            .iter()
            .zip(&raw)
            .map(|(column, value)| render_value(column.kind, value.as_deref()))
            .collect();
        let fields: Vec<&str> = rendered.iter().map(|field| &**field).collect();
        writer.write_row(&fields)?;
    }

    writer.finish()
}

/// Anything that can turn an export job into a file.
#[async_trait]
pub trait ExportSource: Send + Sync {
    /// Runs one job and returns the produced file.
    ///
    /// # Errors
    /// Returns the error that aborted the job.
    async fn export(&self, job: &ExportJob) -> Result<ExportedFile>;

    /// Path the job's file is written to.
    fn output_path(&self, name: &str) -> PathBuf;
}

/// Exports query results from a PostgreSQL server.
#[derive(Debug, Clone)]
pub struct Exporter {
    descriptor: ConnectionDescriptor,
    settings: ExportSettings,
}

impl Exporter {
    /// Creates an exporter for one server.
    pub fn new(descriptor: ConnectionDescriptor, settings: ExportSettings) -> Self {
        Self {
            descriptor,
            settings,
        }
    }

    /// Runs `query` and writes its result to the file for `name`.
    ///
    /// # Errors
    /// - `UnlockError::Connection` if the server cannot be reached (no file
    ///   is produced)
    /// - `UnlockError::Query` if the query cannot be prepared or fails while
    ///   rows are fetched
    /// - `UnlockError::Metadata` for repeated column names or unreadable
    ///   values
    /// - `UnlockError::Write` if the file cannot be written
    pub async fn export_query(&self, name: &str, query: &str) -> Result<ExportedFile> {
        let mut conn = self.descriptor.connect().await?;
        let outcome = self.export_with(&mut conn, name, query).await;

        if let Err(e) = conn.close().await {
            tracing::debug!("Closing connection after '{}' failed: {}", name, e);
        }

        outcome
    }

    async fn export_with(
        &self,
        conn: &mut PgConnection,
        name: &str,
        query: &str,
    ) -> Result<ExportedFile> {
        let statement = (&mut *conn).prepare(query).await.map_err(|e| {
            UnlockError::query_failed(format!("Failed to prepare query for '{}'", name), e)
        })?;

        let columns: Vec<ColumnSpec> = statement
            .columns()
            .iter()
            .map(ColumnSpec::from_column)
            .collect();
        ensure_unique_columns(name, &columns)?;

        tracing::debug!("'{}' returns {} columns", name, columns.len());

        let path = self.settings.output_path(name);
        let width = columns.len();
        let rows = sqlx::raw_sql(query).fetch(&mut *conn).map(|row| {
            let row = row.map_err(|e| {
                UnlockError::query_failed(format!("Failed to fetch rows for '{}'", name), e)
            })?;
            decode_row(&row, width, name)
        });

        let row_count = write_rows(&path, &self.settings, &columns, rows).await?;

        tracing::info!(
            "Data exported for {}: {} rows -> {}",
            name,
            row_count,
            path.display()
        );

        Ok(ExportedFile {
            name: name.to_string(),
            path,
            columns: columns.into_iter().map(|c| c.name).collect(),
            rows: row_count,
        })
    }
}

/// Reads every value of a text-format row as its raw server text.
fn decode_row(row: &PgRow, width: usize, job: &str) -> Result<RawRow> {
    if row.len() != width {
        return Err(UnlockError::metadata(format!(
            "row for '{}' has {} values, result has {} columns",
            job,
            row.len(),
            width
        )));
    }

    (0..width)
        .map(|index| {
            row.try_get_unchecked::<Option<String>, _>(index)
                .map_err(|e| {
                    UnlockError::metadata(format!(
                        "Failed to read column {} of '{}': {}",
                        index, job, e
                    ))
                })
        })
        .collect()
}

#[async_trait]
impl ExportSource for Exporter {
    async fn export(&self, job: &ExportJob) -> Result<ExportedFile> {
        self.export_query(&job.name, &job.query).await
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.settings.output_path(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn columns(names: &[&str]) -> Vec<ColumnSpec> {
        names.iter().map(|n| ColumnSpec::new(*n, "TEXT")).collect()
    }

    #[test]
    fn test_output_naming() {
        let settings = ExportSettings::new("/tmp/out");
        assert_eq!(settings.file_name("class"), "up_class.csv");
        assert_eq!(
            settings.output_path("tables_size"),
            PathBuf::from("/tmp/out/up_tables_size.csv")
        );

        let settings = settings.with_prefix("");
        assert_eq!(settings.file_name("class"), "class.csv");
    }

    #[test]
    fn test_column_kind_from_type() {
        let column = ColumnSpec::new("relispartition", "BOOL");
        assert_eq!(column.kind, ValueKind::Boolean);
        assert_eq!(column.type_name, "BOOL");
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = ensure_unique_columns("t1", &columns(&["a", "b", "a"]));
        let error = result.unwrap_err();
        assert!(matches!(error, UnlockError::Metadata { .. }));
        assert!(error.to_string().contains("duplicate column name 'a'"));

        assert!(ensure_unique_columns("t1", &columns(&["a", "b"])).is_ok());
    }

    #[tokio::test]
    async fn test_write_rows_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let path = settings.output_path("t1");
        let columns = vec![ColumnSpec::new("a", "INT4")];

        let rows = stream::iter(vec![Ok(vec![Some("1".to_string())])]);
        let count = write_rows(&path, &settings, &columns, rows).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\n1\n");
    }

    #[tokio::test]
    async fn test_write_rows_applies_rendering_rules() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let path = settings.output_path("mixed");
        let columns = vec![
            ColumnSpec::new("flag", "BOOL"),
            ColumnSpec::new("n", "INT8"),
            ColumnSpec::new("note", "TEXT"),
        ];

        let rows = stream::iter(vec![
            Ok(vec![Some("t".to_string()), Some("7".to_string()), None]),
            Ok(vec![None, None, Some("a,b".to_string())]),
        ]);
        write_rows(&path, &settings, &columns, rows).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "flag,n,note\ntrue,7,\n,,\"a,b\"\n"
        );
    }

    #[tokio::test]
    async fn test_write_rows_empty_result_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let path = settings.output_path("empty");

        let rows = stream::iter(Vec::<Result<RawRow>>::new());
        let count = write_rows(&path, &settings, &columns(&["a", "b"]), rows)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n");
    }

    #[tokio::test]
    async fn test_write_rows_stops_on_error_and_keeps_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let path = settings.output_path("partial");

        let rows = stream::iter(vec![
            Ok(vec![Some("1".to_string())]),
            Err(UnlockError::metadata("stream broke")),
            Ok(vec![Some("3".to_string())]),
        ]);
        let error = write_rows(&path, &settings, &columns(&["a"]), rows)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("stream broke"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\n1\n");
    }

    #[tokio::test]
    async fn test_write_rows_rejects_short_row() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let path = settings.output_path("short");

        let rows = stream::iter(vec![Ok(vec![Some("1".to_string())])]);
        let error = write_rows(&path, &settings, &columns(&["a", "b"]), rows)
            .await
            .unwrap_err();

        assert!(matches!(error, UnlockError::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_export_unreachable_server_produces_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ExportSettings::new(dir.path());
        let descriptor = ConnectionDescriptor::new("127.0.0.1", "nobody").with_port(1);
        let exporter = Exporter::new(descriptor, settings.clone());

        let error = exporter
            .export_query("t1", "SELECT 1 AS a")
            .await
            .unwrap_err();

        assert!(matches!(error, UnlockError::Connection { .. }));
        assert!(!settings.output_path("t1").exists());
    }
}
