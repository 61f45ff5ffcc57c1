//! Delimited file writer.
//!
//! Wraps a `csv::Writer` and enforces that every record has exactly as many
//! fields as the header.

use super::{ExportSettings, QuoteMode};
use crate::{Result, error::UnlockError};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Streaming writer for one exported file.
#[derive(Debug)]
pub struct DelimitedWriter {
    inner: csv::Writer<File>,
    path: PathBuf,
    width: usize,
    rows: u64,
}

impl DelimitedWriter {
    /// Creates (or truncates) `path` and writes the header record.
    ///
    /// # Errors
    /// Returns `UnlockError::Metadata` for an empty header and
    /// `UnlockError::Write` if the file cannot be created or written.
    pub fn create<T: AsRef<[u8]>>(
        path: &Path,
        settings: &ExportSettings,
        header: &[T],
    ) -> Result<Self> {
        if header.is_empty() {
            return Err(UnlockError::metadata(format!(
                "result for {} has no columns",
                path.display()
            )));
        }

        let file = File::create(path).map_err(|e| {
            UnlockError::write_failed(format!("Failed to create {}", path.display()), e)
        })?;

        let quote_style = match settings.quote_mode {
            QuoteMode::Necessary => csv::QuoteStyle::Necessary,
            QuoteMode::Always => csv::QuoteStyle::Always,
        };

        let inner = csv::WriterBuilder::new()
            .delimiter(settings.delimiter)
            .quote(b'"')
            .double_quote(true)
            .quote_style(quote_style)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        let mut writer = Self {
            inner,
            path: path.to_path_buf(),
            width: header.len(),
            rows: 0,
        };

        writer.inner.write_record(header).map_err(|e| {
            UnlockError::write_failed(
                format!("Failed to write header to {}", writer.path.display()),
                e,
            )
        })?;

        Ok(writer)
    }

    /// Appends one record.
    ///
    /// # Errors
    /// Returns `UnlockError::Metadata` if the field count differs from the
    /// header and `UnlockError::Write` on I/O failure.
    pub fn write_row<T: AsRef<[u8]>>(&mut self, fields: &[T]) -> Result<()> {
        if fields.len() != self.width {
            return Err(UnlockError::metadata(format!(
                "row {} of {} has {} fields, header has {}",
                self.rows.saturating_add(1),
                self.path.display(),
                fields.len(),
                self.width
            )));
        }

        self.inner.write_record(fields).map_err(|e| {
            UnlockError::write_failed(
                format!("Failed to write row to {}", self.path.display()),
                e,
            )
        })?;
        self.rows = self.rows.saturating_add(1);
        Ok(())
    }

    /// Number of data records written so far.
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes buffered records and returns the data record count.
    ///
    /// # Errors
    /// Returns `UnlockError::Write` if the flush fails.
    pub fn finish(mut self) -> Result<u64> {
        self.inner.flush().map_err(|e| {
            UnlockError::write_failed(format!("Failed to flush {}", self.path.display()), e)
        })?;
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path) -> ExportSettings {
        ExportSettings::new(dir)
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut writer = DelimitedWriter::create(&path, &settings(dir.path()), &["a", "b"]).unwrap();
        writer.write_row(&["1", "x"]).unwrap();
        writer.write_row(&["2", ""]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,x\n2,\n");
    }

    #[test]
    fn test_quoting_of_special_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut writer = DelimitedWriter::create(&path, &settings(dir.path()), &["v"]).unwrap();
        writer.write_row(&["has,comma"]).unwrap();
        writer.write_row(&["say \"hi\""]).unwrap();
        writer.write_row(&["two\nlines"]).unwrap();
        writer.finish().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "v\n\"has,comma\"\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n"
        );
    }

    #[test]
    fn test_quote_always() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let settings = settings(dir.path()).with_quote_mode(QuoteMode::Always);

        let mut writer = DelimitedWriter::create(&path, &settings, &["a"]).unwrap();
        writer.write_row(&["1"]).unwrap();
        writer.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"a\"\n\"1\"\n");
    }

    #[test]
    fn test_short_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut writer = DelimitedWriter::create(&path, &settings(dir.path()), &["a", "b"]).unwrap();
        let error = writer.write_row(&["only-one"]).unwrap_err();

        assert!(matches!(error, UnlockError::Metadata { .. }));
        assert!(error.to_string().contains("has 1 fields, header has 2"));
        assert_eq!(writer.rows(), 0);
    }

    #[test]
    fn test_empty_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header: [&str; 0] = [];

        let error = DelimitedWriter::create(&path, &settings(dir.path()), &header).unwrap_err();
        assert!(matches!(error, UnlockError::Metadata { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");

        let error = DelimitedWriter::create(&path, &settings(dir.path()), &["a"]).unwrap_err();
        assert!(matches!(error, UnlockError::Write { .. }));
    }

    #[test]
    fn test_existing_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale,content\nfrom,before\nmore,rows\n").unwrap();

        let writer = DelimitedWriter::create(&path, &settings(dir.path()), &["a"]).unwrap();
        writer.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\n");
    }
}
