//! Recovery coverage beyond `src/recovery.rs`'s unit tests: selecting a
//! subset of catalogued containers by name, and filling gaps left by a
//! block that the scan never found.

use std::fs;

use sbxguard::container::{encode_file, EncodeOptions};
use sbxguard::recovery::{reconstruct, scan_into_db, RecoOptions, RecoSelector};
use tempfile::tempdir;

#[test]
fn selects_one_container_by_original_filename() {
    let dir = tempdir().unwrap();

    let a_src = dir.path().join("alpha.bin");
    fs::write(&a_src, vec![1u8; 400]).unwrap();
    let a_sbx = dir.path().join("alpha.bin.sbx");
    encode_file(&a_src, &a_sbx, &EncodeOptions::default()).unwrap();

    let b_src = dir.path().join("beta.bin");
    fs::write(&b_src, vec![2u8; 400]).unwrap();
    let b_sbx = dir.path().join("beta.bin.sbx");
    encode_file(&b_src, &b_sbx, &EncodeOptions::default()).unwrap();

    let db = dir.path().join("scan.db");
    scan_into_db(&[a_sbx.clone(), b_sbx.clone()], &db).unwrap();

    let out_dir = dir.path().join("out");
    let written = reconstruct(
        &db,
        &out_dir,
        &RecoSelector::FileNames(vec!["alpha.bin".to_string()]),
        &RecoOptions { overwrite: true, ..Default::default() },
    )
    .unwrap();

    assert_eq!(written.len(), 1);
    assert_eq!(fs::read(&written[0]).unwrap(), fs::read(&a_sbx).unwrap());
}

#[test]
fn fills_a_block_the_scan_never_recorded() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("c.bin");
    fs::write(&src, vec![3u8; 3000]).unwrap();
    let sbx = dir.path().join("c.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions::default()).unwrap();

    // Drop block 2 from the sidecar bytes on disk before scanning, so the
    // scan never observes it.
    let mut bytes = fs::read(&sbx).unwrap();
    let blocksize = 512;
    bytes.drain(2 * blocksize..3 * blocksize);
    fs::write(&sbx, &bytes).unwrap();

    let db = dir.path().join("scan.db");
    scan_into_db(&[sbx.clone()], &db).unwrap();

    let out_dir = dir.path().join("out");
    let result = reconstruct(&db, &out_dir, &RecoSelector::All, &RecoOptions::default());
    assert!(result.is_err());

    let written = reconstruct(
        &db,
        &out_dir,
        &RecoSelector::All,
        &RecoOptions { fill_missing: true, overwrite: true },
    )
    .unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(fs::metadata(&written[0]).unwrap().len(), bytes.len() as u64 + blocksize as u64);
}
