//! Checker coverage beyond what `src/checker.rs`'s unit tests already
//! exercise: recursive directory walks and folders with a mix of clean,
//! drifted, and sidecar-less files.

use std::fs;

use sbxguard::checker::{check_directory, sidecar_path_for, CheckOptions, CheckStatus};
use sbxguard::container::{encode_file, EncodeOptions};
use tempfile::tempdir;

#[test]
fn recursive_walk_finds_nested_sidecars() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("sub/dir");
    fs::create_dir_all(&nested).unwrap();

    let top = dir.path().join("top.txt");
    fs::write(&top, b"top level file").unwrap();
    encode_file(&top, &sidecar_path_for(&top), &EncodeOptions::default()).unwrap();

    let deep = nested.join("deep.txt");
    fs::write(&deep, b"nested file content").unwrap();
    encode_file(&deep, &sidecar_path_for(&deep), &EncodeOptions::default()).unwrap();

    let shallow = check_directory(dir.path(), &CheckOptions::default()).unwrap();
    assert_eq!(shallow.checked.len(), 1);

    let deep_report = check_directory(dir.path(), &CheckOptions { recursive: true, ..Default::default() }).unwrap();
    assert_eq!(deep_report.checked.len(), 2);
}

#[test]
fn mixed_folder_reports_each_file_independently() {
    let dir = tempdir().unwrap();

    let clean = dir.path().join("clean.txt");
    fs::write(&clean, b"never touched again").unwrap();
    encode_file(&clean, &sidecar_path_for(&clean), &EncodeOptions::default()).unwrap();

    let drifted = dir.path().join("drifted.txt");
    fs::write(&drifted, b"will be corrupted").unwrap();
    encode_file(&drifted, &sidecar_path_for(&drifted), &EncodeOptions::default()).unwrap();
    fs::write(&drifted, b"something else entirely now").unwrap();

    fs::write(dir.path().join("unshielded.txt"), b"no sidecar").unwrap();

    let report = check_directory(dir.path(), &CheckOptions::default()).unwrap();
    assert_eq!(report.checked.len(), 2);

    let statuses: Vec<_> = report.checked.iter().map(|c| (c.path.file_name().unwrap().to_str().unwrap(), c.status.clone())).collect();
    assert!(statuses.contains(&("clean.txt", CheckStatus::Ok)));
    assert!(statuses.contains(&("drifted.txt", CheckStatus::Mismatch)));
}
