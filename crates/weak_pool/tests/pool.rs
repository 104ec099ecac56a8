// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for [`StringPool`] end-to-end lifecycles.

use weak_pool::{INITIAL_CAPACITY, InternedStr, StringPool};

#[test]
fn hello_world_lifecycle() {
    let pool = StringPool::new();
    let handle = pool.intern(b"Hello World");
    assert_eq!(handle.as_bytes(), b"Hello World");
    assert_eq!(handle.as_str(), Some("Hello World"));
    assert_eq!(pool.len(), 1);

    drop(handle);
    assert_eq!(pool.len(), 0);
}

#[test]
fn empty_string_is_canonical_and_never_fails() {
    let pool = StringPool::new();
    let empty = pool.intern(b"");
    assert_eq!(empty.len(), 0);
    assert_eq!(empty.as_bytes(), b"");
    assert!(InternedStr::ptr_eq(&empty, &pool.intern(b"")));
    // The empty handle does not occupy a slot.
    assert_eq!(pool.len(), 0);
}

#[test]
fn single_byte_identity() {
    let pool = StringPool::new();
    for b in b'a'..=b'z' {
        let first = pool.intern(&[b]);
        let second = pool.intern(&[b]);
        assert!(InternedStr::ptr_eq(&first, &second));
        assert_eq!(first.as_bytes(), &[b]);
    }
}

#[test]
fn overfilling_the_initial_table_forces_growth() {
    let pool = StringPool::new();
    assert_eq!(pool.capacity(), INITIAL_CAPACITY);

    let handles: Vec<_> = (0..128_u8).map(|b| pool.intern(&[b])).collect();

    assert!(pool.capacity() >= 128, "capacity is {}", pool.capacity());
    assert_eq!(pool.len(), 128);
    for (b, held) in (0..128_u8).zip(&handles) {
        let fresh = pool.intern(&[b]);
        assert!(InternedStr::ptr_eq(held, &fresh), "byte {b} lost identity across growth");
    }
}

#[test]
fn interned_handles_work_as_map_keys() {
    let pool = StringPool::new();
    let mut seen = std::collections::HashSet::new();
    for word in ["fn", "let", "match", "fn", "let"] {
        seen.insert(pool.intern_str(word));
    }
    assert_eq!(seen.len(), 3);
    assert!(seen.contains(&pool.intern_str("match")));
}

#[test]
fn equality_is_by_content_identity_is_by_pointer() {
    let pool = StringPool::new();
    let other_pool = StringPool::new();
    let a = pool.intern(b"same bytes");
    let b = other_pool.intern(b"same bytes");
    assert_eq!(a, b);
    assert!(!InternedStr::ptr_eq(&a, &b));
}

#[test]
fn concurrent_interning_across_pool_clones() {
    let pool = StringPool::new();
    let keys: Vec<Vec<u8>> = (0..64_u32).map(|i| format!("key-{i}").into_bytes()).collect();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let pool = pool.clone();
            let keys = &keys;
            scope.spawn(move || {
                for _ in 0..200 {
                    for key in keys {
                        let handle = pool.intern(key);
                        assert_eq!(handle.as_bytes(), &key[..]);
                    }
                }
            });
        }
    });

    // Quiesced: one canonical handle per key.
    for key in &keys {
        let a = pool.intern(key);
        let b = pool.intern(key);
        assert!(InternedStr::ptr_eq(&a, &b));
    }
    assert_eq!(pool.len(), 64);
}

#[test]
fn concurrent_growth_and_reclamation_churn() {
    let pool = StringPool::new();

    std::thread::scope(|scope| {
        // Writers churn overlapping key ranges, dropping handles as they go
        // so reclamation and growth interleave.
        for worker in 0..4_u64 {
            let pool = pool.clone();
            scope.spawn(move || {
                let mut rng = fastrand::Rng::with_seed(worker * 31 + 1);
                let mut held = Vec::new();
                for _ in 0..3_000 {
                    let key = rng.u32(0..500).to_le_bytes();
                    held.push(pool.intern(&key));
                    if held.len() > 32 {
                        held.drain(..16);
                    }
                }
            });
        }
        // A reader hammers lookups the whole time.
        let reader = pool.clone();
        scope.spawn(move || {
            let mut rng = fastrand::Rng::with_seed(99);
            for _ in 0..10_000 {
                let key = rng.u32(0..500).to_le_bytes();
                let _ = reader.contains(&key);
            }
        });
    });

    // All handles dropped: everything is reclaimable.
    assert_eq!(pool.len(), 0);
    let a = pool.intern(b"after the storm");
    assert_eq!(pool.len(), 1);
    assert!(InternedStr::ptr_eq(&a, &pool.intern(b"after the storm")));
}
