//! Literal scenarios S1-S6: concrete inputs with concrete, hand-computed
//! expected outputs, as distinct from the property-based tests in
//! `roundtrip.rs`.

use std::fs;

use sbxguard::checker::{check_directory, sidecar_path_for, CheckOptions, CheckStatus};
use sbxguard::container::{decode_file, encode_file, raid_path_for, DecodeOptions, EncodeOptions};
use tempfile::tempdir;

fn repeated(s: &str, n: usize) -> Vec<u8> {
    s.repeat(n).into_bytes()
}

#[test]
fn s1_v1_1000_bytes_hello_x200() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("f.bin");
    let data = repeated("Hello", 200);
    assert_eq!(data.len(), 1000);
    fs::write(&src, &data).unwrap();

    let sbx = dir.path().join("f.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions { version: 1, ..Default::default() }).unwrap();

    let bytes = fs::read(&sbx).unwrap();
    assert_eq!(bytes.len(), 5 * 512);
    assert_eq!(&bytes[0..3], b"SBx");
    assert_eq!(bytes[3], 1);
}

#[test]
fn s2_v2_same_file_one_block() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("f.bin");
    fs::write(&src, repeated("Hello", 200)).unwrap();

    let sbx = dir.path().join("f.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions { version: 2, ..Default::default() }).unwrap();

    let bytes = fs::read(&sbx).unwrap();
    assert_eq!(bytes.len(), 2 * 4096);
}

#[test]
fn s3_empty_file_v1() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("empty.bin");
    fs::write(&src, b"").unwrap();

    let sbx = dir.path().join("empty.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions { version: 1, ..Default::default() }).unwrap();
    assert_eq!(fs::metadata(&sbx).unwrap().len(), 512);

    let out = dir.path().join("empty.out");
    let report = decode_file(&sbx, &out, &DecodeOptions { version: 1, ..Default::default() }).unwrap();
    assert_eq!(report.bytes_written, 0);
    assert_eq!(fs::read(&out).unwrap(), Vec::<u8>::new());
}

#[test]
fn s4_raid_recovers_a_stomped_block() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("f.bin");
    fs::write(&src, repeated("A", 3000)).unwrap();

    let sbx = dir.path().join("f.bin.sbx");
    encode_file(&src, &sbx, &EncodeOptions { version: 1, raid: true, ..Default::default() }).unwrap();

    let mut bytes = fs::read(&sbx).unwrap();
    for b in &mut bytes[512..1024] {
        *b = 0xAA;
    }
    fs::write(&sbx, &bytes).unwrap();

    let out = dir.path().join("f.out");
    let report = decode_file(
        &sbx,
        &out,
        &DecodeOptions { version: 1, raid: true, ..Default::default() },
    )
    .unwrap();
    assert_eq!(fs::read(&out).unwrap(), repeated("A", 3000));
    assert!(report.hash_verified);

    let out2 = dir.path().join("f2.out");
    let result = decode_file(&sbx, &out2, &DecodeOptions { version: 1, ..Default::default() });
    assert!(result.is_err());

    let _ = raid_path_for(&sbx);
}

#[test]
fn s5_password_obfuscates_and_reverses() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("f.bin");
    fs::write(&src, repeated("A", 500)).unwrap();

    let sbx = dir.path().join("f.bin.sbx");
    encode_file(
        &src,
        &sbx,
        &EncodeOptions { version: 1, password: Some("1234".into()), ..Default::default() },
    )
    .unwrap();

    let bytes = fs::read(&sbx).unwrap();
    assert_ne!(bytes[528], b'A');

    let out = dir.path().join("f.out");
    decode_file(
        &sbx,
        &out,
        &DecodeOptions { version: 1, password: Some("1234".into()), ..Default::default() },
    )
    .unwrap();
    assert_eq!(fs::read(&out).unwrap()[0], b'A');
}

#[test]
fn s6_checker_auto_repairs_from_sidecar() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f.txt");
    let mut original = vec![b'H'; 1];
    original.extend_from_slice(b"ello, this is the rest of a perfectly ordinary file.");
    fs::write(&path, &original).unwrap();

    let sbx = sidecar_path_for(&path);
    encode_file(&path, &sbx, &EncodeOptions { raid: true, ..Default::default() }).unwrap();

    let mut corrupted = original.clone();
    for b in corrupted.iter_mut().take(100.min(corrupted.len())) {
        *b = b'A';
    }
    fs::write(&path, &corrupted).unwrap();

    let opts = CheckOptions { auto: true, raid: true, ..Default::default() };
    let report = check_directory(dir.path(), &opts).unwrap();
    assert_eq!(report.checked[0].status, CheckStatus::Repaired);
    assert_eq!(fs::read(&path).unwrap()[0], b'H');
}
