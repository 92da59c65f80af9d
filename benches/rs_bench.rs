//! Throughput benchmarks for the Reed-Solomon codec and the block codec
//! built on top of it: bytes/sec through RS
//! encode/decode at the parity levels the two container versions use.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sbxguard::block::{encode_block, V1, V2};
use sbxguard::rs;

fn rs_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("rs_roundtrip");
    for &parity in &[20usize, 108, 107] {
        let msg_len = 255 - parity;
        let msg = vec![0x5Au8; msg_len];
        group.throughput(Throughput::Bytes(msg_len as u64));
        group.bench_with_input(BenchmarkId::new("encode", parity), &parity, |b, &parity| {
            b.iter(|| rs::encode(black_box(&msg), parity).unwrap());
        });

        let codeword = rs::encode(&msg, parity).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", parity), &parity, |b, &parity| {
            b.iter(|| rs::decode(black_box(&codeword), parity).unwrap());
        });
    }
    group.finish();
}

fn block_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_encode");
    let uid = [1u8, 2, 3, 4, 5, 6];

    let data_v1 = vec![0x42u8; V1.chunk_read_size];
    group.throughput(Throughput::Bytes(V1.chunk_read_size as u64));
    group.bench_function("v1", |b| {
        b.iter(|| encode_block(&V1, uid, 1, black_box(&data_v1)).unwrap());
    });

    let data_v2 = vec![0x42u8; V2.chunk_read_size];
    group.throughput(Throughput::Bytes(V2.chunk_read_size as u64));
    group.bench_function("v2", |b| {
        b.iter(|| encode_block(&V2, uid, 1, black_box(&data_v2)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, rs_roundtrip, block_encode);
criterion_main!(benches);
