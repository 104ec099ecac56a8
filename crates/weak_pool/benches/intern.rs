// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Performance benchmarks for the string pool.
//!
//! Run with: cargo bench -p weak_pool
//! Save baseline: cargo bench -p weak_pool -- --save-baseline main
//! Compare to baseline: cargo bench -p weak_pool -- --baseline main

#![allow(missing_docs, reason = "benchmark code")]

use criterion::{Criterion, criterion_group, criterion_main};
use weak_pool::StringPool;

/// Hot path: the entry exists and stays alive; every intern is a probe plus
/// one publication window.
fn bench_hit(c: &mut Criterion) {
    let pool = StringPool::new();
    let keep = pool.intern(b"content-length");

    c.bench_function("intern_hit", |b| {
        b.iter(|| pool.intern(b"content-length"));
    });

    drop(keep);
}

/// Cold path: the handle drops immediately, so every intern allocates,
/// publishes, verifies, and then reclaims its entry.
fn bench_miss_and_reclaim(c: &mut Criterion) {
    let pool = StringPool::new();

    c.bench_function("intern_miss_and_reclaim", |b| {
        b.iter(|| pool.intern(b"never twice alive"));
    });
}

/// A tokenizer-shaped workload: a fixed vocabulary hit in rotation, handles
/// held in a sliding window.
fn bench_vocabulary(c: &mut Criterion) {
    let pool = StringPool::new();
    let vocabulary: Vec<Vec<u8>> = (0..256_u32).map(|i| format!("token-{i}").into_bytes()).collect();

    c.bench_function("intern_vocabulary_256", |b| {
        let mut held = Vec::with_capacity(64);
        let mut next = 0_usize;
        b.iter(|| {
            let word = &vocabulary[next & 255];
            next = next.wrapping_add(1);
            held.push(pool.intern(word));
            if held.len() == 64 {
                held.clear();
            }
        });
    });
}

/// Pointer-speed lookup of an entry that is never inserted.
fn bench_contains_miss(c: &mut Criterion) {
    let pool = StringPool::new();
    let keep: Vec<_> = (0..64_u32).map(|i| pool.intern(format!("resident-{i}").as_bytes())).collect();

    c.bench_function("contains_miss", |b| {
        b.iter(|| pool.contains(b"absent"));
    });

    drop(keep);
}

criterion_group!(benches, bench_hit, bench_miss_and_reclaim, bench_vocabulary, bench_contains_miss);
criterion_main!(benches);
