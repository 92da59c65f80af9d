//! Property tests for the round-trip, size, padding, and framing
//! invariants a container format like this one must hold.
//! File sizes are capped well below the documented 10 MiB ceiling so the
//! suite stays fast; the codec has no size-dependent branch above a few
//! KiB, so this still exercises every code path the larger bound would.

use std::fs;

use proptest::prelude::*;
use sbxguard::block::{V1, V2};
use sbxguard::container::{decode_file, encode_file, DecodeOptions, EncodeOptions};
use tempfile::tempdir;

fn roundtrip_one(data: &[u8], version: u8, raid: bool, password: Option<String>) {
    let dir = tempdir().unwrap();
    let src = dir.path().join("f.bin");
    fs::write(&src, data).unwrap();
    let sbx = dir.path().join("f.bin.sbx");

    encode_file(
        &src,
        &sbx,
        &EncodeOptions { version, raid, password: password.clone(), uid: None },
    )
    .unwrap();

    let out = dir.path().join("f.out");
    let report = decode_file(&sbx, &out, &DecodeOptions { version, raid, password, ..Default::default() }).unwrap();

    assert_eq!(fs::read(&out).unwrap(), data);
    assert!(report.hash_verified);
}

proptest! {
    #[test]
    fn roundtrip_v1_no_raid_no_password(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        roundtrip_one(&data, 1, false, None);
    }

    #[test]
    fn roundtrip_v2_no_raid_no_password(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        roundtrip_one(&data, 2, false, None);
    }

    #[test]
    fn roundtrip_with_raid(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        roundtrip_one(&data, 1, true, None);
    }

    #[test]
    fn roundtrip_with_password(data in proptest::collection::vec(any::<u8>(), 0..20_000), pw in "[ -~]{1,16}") {
        roundtrip_one(&data, 1, false, Some(pw));
    }

    #[test]
    fn size_law_v1(len in 0usize..20_000) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f.bin");
        fs::write(&src, vec![0x42u8; len]).unwrap();
        let sbx = dir.path().join("f.bin.sbx");
        encode_file(&src, &sbx, &EncodeOptions { version: 1, ..Default::default() }).unwrap();

        let expected_blocks = if len == 0 { 1 } else { 1 + (len + V1.chunk_read_size - 1) / V1.chunk_read_size };
        prop_assert_eq!(fs::metadata(&sbx).unwrap().len(), (expected_blocks * V1.blocksize) as u64);
    }

    #[test]
    fn block_framing_holds_for_every_block(len in 1usize..20_000) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("f.bin");
        fs::write(&src, vec![0x7Fu8; len]).unwrap();
        let sbx = dir.path().join("f.bin.sbx");
        encode_file(&src, &sbx, &EncodeOptions { version: 2, ..Default::default() }).unwrap();

        let bytes = fs::read(&sbx).unwrap();
        for chunk in bytes.chunks(V2.blocksize) {
            prop_assert_eq!(&chunk[0..3], b"SBx");
            prop_assert_eq!(chunk[3], 2);
            let tail = &chunk[chunk.len() - V2.tailpad..];
            prop_assert!(tail.iter().all(|&b| b == 0x1A));
        }
    }
}
