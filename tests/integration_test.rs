//! Whole-file encode/decode integration coverage that the per-module unit
//! tests in `src/container.rs` don't already exercise: multi-block files
//! through the public binary-facing API surface.

use std::fs;

use sbxguard::container::{decode_file, encode_file, DecodeOptions, EncodeOptions};
use tempfile::tempdir;

#[test]
fn roundtrips_a_multi_megabyte_file_at_v2() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("big.bin");
    let data: Vec<u8> = (0..2_500_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&src, &data).unwrap();

    let sbx = dir.path().join("big.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions { version: 2, ..Default::default() }).unwrap();

    let out = dir.path().join("big.out");
    let report = decode_file(&sbx, &out, &DecodeOptions { version: 2, ..Default::default() }).unwrap();

    assert!(report.hash_verified);
    assert_eq!(fs::read(&out).unwrap(), data);
}

#[test]
fn refuses_to_decode_a_file_that_is_not_an_sbx_container() {
    let dir = tempdir().unwrap();
    let not_sbx = dir.path().join("plain.txt");
    fs::write(&not_sbx, b"just a regular file, no magic bytes here").unwrap();

    let out = dir.path().join("out.bin");
    let result = decode_file(&not_sbx, &out, &DecodeOptions::default());
    assert!(result.is_err());
}
