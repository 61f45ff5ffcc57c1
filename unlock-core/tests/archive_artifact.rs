//! Archive tests: container contents, skipped inputs, and artifact decoding.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use unlock_core::UnlockError;
use unlock_core::archive::{ArchiveSettings, Archiver, Compression};

/// Decompresses an artifact and returns its entries as (name, bytes).
fn unpack(artifact: &Path, compression: Compression) -> Vec<(String, Vec<u8>)> {
    let file = File::open(artifact).expect("artifact should exist");
    let reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Zstd => Box::new(zstd::Decoder::new(file).unwrap()),
    };

    let mut archive = tar::Archive::new(reader);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            (name, bytes)
        })
        .collect()
}

fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_two_files_round_trip_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = write_input(dir.path(), "f1.csv", "a,b\n1,2\n");
    let f2 = write_input(dir.path(), "f2.csv", "c\n\"x,y\"\n");

    let archiver = Archiver::new(ArchiveSettings::new(dir.path()));
    let report = archiver.archive(&[&f1, &f2]).unwrap();

    assert!(report.skipped.is_empty());
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.entries[0].name, "f1.csv");
    assert_eq!(report.entries[0].size, 8);
    assert_eq!(report.entries[1].name, "f2.csv");

    let entries = unpack(&report.artifact, Compression::Gzip);
    assert_eq!(
        entries,
        vec![
            ("f1.csv".to_string(), b"a,b\n1,2\n".to_vec()),
            ("f2.csv".to_string(), b"c\n\"x,y\"\n".to_vec()),
        ]
    );

    // The intermediate container is kept by default
    assert!(report.container.exists());
    assert!(!report.container_removed);
}

#[test]
fn test_missing_inputs_are_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let present = [
        write_input(dir.path(), "up_class.csv", "relname\npg_class\n"),
        write_input(dir.path(), "up_index.csv", "indexrelid\n2662\n"),
        write_input(dir.path(), "up_tables.csv", "tablename\n"),
    ];
    let missing = [
        dir.path().join("up_gone.csv"),
        dir.path().join("nested/up_absent.csv"),
    ];

    let inputs = vec![
        present[0].clone(),
        missing[0].clone(),
        present[1].clone(),
        missing[1].clone(),
        present[2].clone(),
    ];

    let archiver = Archiver::new(ArchiveSettings::new(dir.path()));
    let report = archiver.archive(&inputs).unwrap();

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].path, missing[0]);
    assert_eq!(report.skipped[1].path, missing[1]);
    assert_ne!(
        report.skipped[0].error.to_string(),
        report.skipped[1].error.to_string()
    );
    assert!(
        report
            .skipped
            .iter()
            .all(|s| matches!(s.error, UnlockError::Metadata { .. }))
    );

    let names: Vec<String> = unpack(&report.artifact, Compression::Gzip)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["up_class.csv", "up_index.csv", "up_tables.csv"]);
}

#[test]
fn test_no_inputs_produces_valid_empty_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(ArchiveSettings::new(dir.path()));

    let inputs: [PathBuf; 0] = [];
    let report = archiver.archive(&inputs).unwrap();

    assert!(report.entries.is_empty());
    assert!(unpack(&report.artifact, Compression::Gzip).is_empty());
}

#[test]
fn test_zstd_artifact_with_custom_names() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = write_input(dir.path(), "up_settings.csv", "name,setting\nwork_mem,4096\n");

    let settings = ArchiveSettings::new(dir.path())
        .with_container_name("snapshot.tar")
        .with_artifact_name("snapshot.tar.zst")
        .with_compression(Compression::Zstd)
        .with_level(9);
    let report = Archiver::new(settings).archive(&[&f1]).unwrap();

    assert_eq!(report.container, dir.path().join("snapshot.tar"));
    assert_eq!(report.artifact, dir.path().join("snapshot.tar.zst"));

    let entries = unpack(&report.artifact, Compression::Zstd);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1, b"name,setting\nwork_mem,4096\n");
}

#[test]
fn test_rerun_overwrites_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(ArchiveSettings::new(dir.path()));

    let first = write_input(dir.path(), "first.csv", "a\n1\n");
    let second = write_input(dir.path(), "second.csv", "b\n2\n");
    archiver.archive(&[&first, &second]).unwrap();

    let second = write_input(dir.path(), "second.csv", "b\n3\n");
    let report = archiver.archive(&[&second]).unwrap();

    let entries = unpack(&report.artifact, Compression::Gzip);
    assert_eq!(entries, vec![("second.csv".to_string(), b"b\n3\n".to_vec())]);

    let names: Vec<String> = tar::Archive::new(File::open(&report.container).unwrap())
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["second.csv"]);
}

#[cfg(unix)]
#[test]
fn test_entry_mode_and_mtime_follow_input() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let f1 = write_input(dir.path(), "up_namespace.csv", "nspname\npublic\n");
    std::fs::set_permissions(&f1, std::fs::Permissions::from_mode(0o640)).unwrap();
    let modified = std::fs::metadata(&f1).unwrap().modified().unwrap();

    let report = Archiver::new(ArchiveSettings::new(dir.path()))
        .archive(&[&f1])
        .unwrap();
    assert_eq!(report.entries[0].mode, 0o640);

    let mut archive = tar::Archive::new(File::open(&report.container).unwrap());
    let entry = archive.entries().unwrap().next().unwrap().unwrap();
    let header = entry.header();
    assert_eq!(header.mode().unwrap(), 0o640);
    assert_eq!(header.size().unwrap(), 15);

    let expected_mtime = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    assert_eq!(header.mtime().unwrap(), expected_mtime);
}
