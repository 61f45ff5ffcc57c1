//! Whole-file compression pass.

use crate::{Result, error::UnlockError};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::str::FromStr;

/// Compression codec for the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// gzip via `flate2`
    #[default]
    Gzip,
    /// Zstandard via `zstd`
    Zstd,
}

impl Compression {
    /// File extension appended to the container name.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
        }
    }

    /// Level used when none is configured.
    pub const fn default_level(self) -> i32 {
        match self {
            Self::Gzip => 6,
            Self::Zstd => 3,
        }
    }

    /// Checks a level against the codec's accepted range.
    ///
    /// # Errors
    /// Returns a configuration error for an out-of-range level.
    pub fn validate_level(self, level: i32) -> Result<()> {
        let range = match self {
            Self::Gzip => 0..=9,
            Self::Zstd => zstd::compression_level_range(),
        };
        if range.contains(&level) {
            Ok(())
        } else {
            Err(UnlockError::configuration(format!(
                "{} compression level must be within {}..={}, got {}",
                self,
                range.start(),
                range.end(),
                level
            )))
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip => f.write_str("gzip"),
            Self::Zstd => f.write_str("zstd"),
        }
    }
}

impl FromStr for Compression {
    type Err = UnlockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "zstd" | "zst" => Ok(Self::Zstd),
            other => Err(UnlockError::configuration(format!(
                "unknown compression '{}': expected gzip or zstd",
                other
            ))),
        }
    }
}

/// Compresses `source` end to end into `destination` with one encoder
/// stream, overwriting `destination`.
///
/// Returns the number of uncompressed bytes read.
///
/// # Errors
/// Returns `UnlockError::Metadata` if the source cannot be opened and
/// `UnlockError::Write` if the destination cannot be written.
pub fn compress_file(
    source: &Path,
    destination: &Path,
    compression: Compression,
    level: Option<i32>,
) -> Result<u64> {
    let level = level.unwrap_or_else(|| compression.default_level());
    compression.validate_level(level)?;

    let input = File::open(source).map_err(|e| {
        UnlockError::metadata(format!("Failed to open {}: {}", source.display(), e))
    })?;
    let mut input = BufReader::new(input);

    let output = File::create(destination).map_err(|e| {
        UnlockError::write_failed(format!("Failed to create {}", destination.display()), e)
    })?;

    let write_error = |e: io::Error| {
        UnlockError::write_failed(format!("Compression into {} failed", destination.display()), e)
    };

    let (read, output) = match compression {
        Compression::Gzip => {
            let gzip_level = u32::try_from(level).unwrap_or(6);
            let mut encoder =
                flate2::write::GzEncoder::new(output, flate2::Compression::new(gzip_level));
            let read = io::copy(&mut input, &mut encoder).map_err(write_error)?;
            (read, encoder.finish().map_err(write_error)?)
        }
        Compression::Zstd => {
            let mut encoder = zstd::Encoder::new(output, level).map_err(write_error)?;
            let read = io::copy(&mut input, &mut encoder).map_err(write_error)?;
            (read, encoder.finish().map_err(write_error)?)
        }
    };

    let mut output = output;
    output.flush().map_err(write_error)?;
    output.sync_all().map_err(write_error)?;

    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_parse_compression() {
        assert_eq!("gzip".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("GZ".parse::<Compression>().unwrap(), Compression::Gzip);
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("lz4".parse::<Compression>().is_err());
        assert_eq!(Compression::Zstd.to_string(), "zstd");
    }

    #[test]
    fn test_level_validation() {
        assert!(Compression::Gzip.validate_level(9).is_ok());
        assert!(Compression::Gzip.validate_level(10).is_err());
        assert!(Compression::Zstd.validate_level(19).is_ok());
        assert!(Compression::Zstd.validate_level(100).is_err());
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plain");
        let destination = dir.path().join("plain.gz");
        std::fs::write(&source, b"header\nrow\n").unwrap();

        let read = compress_file(&source, &destination, Compression::Gzip, None).unwrap();
        assert_eq!(read, 11);

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(File::open(&destination).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, b"header\nrow\n");
    }

    #[test]
    fn test_zstd_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("plain");
        let destination = dir.path().join("plain.zst");
        std::fs::write(&source, b"header\nrow\n").unwrap();

        compress_file(&source, &destination, Compression::Zstd, Some(19)).unwrap();

        let decoded = zstd::decode_all(File::open(&destination).unwrap()).unwrap();
        assert_eq!(decoded, b"header\nrow\n");
    }

    #[test]
    fn test_empty_source_produces_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("empty");
        std::fs::write(&source, b"").unwrap();

        for compression in [Compression::Gzip, Compression::Zstd] {
            let destination = dir.path().join(format!("empty.{}", compression.extension()));
            assert_eq!(
                compress_file(&source, &destination, compression, None).unwrap(),
                0
            );
            assert!(std::fs::metadata(&destination).unwrap().len() > 0);

            let mut decoded = Vec::new();
            match compression {
                Compression::Gzip => {
                    flate2::read::GzDecoder::new(File::open(&destination).unwrap())
                        .read_to_end(&mut decoded)
                        .unwrap();
                }
                Compression::Zstd => {
                    decoded = zstd::decode_all(File::open(&destination).unwrap()).unwrap();
                }
            }
            assert!(decoded.is_empty());
        }
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let error = compress_file(
            &dir.path().join("absent"),
            &dir.path().join("absent.gz"),
            Compression::Gzip,
            None,
        )
        .unwrap_err();
        assert!(matches!(error, UnlockError::Metadata { .. }));
    }
}
