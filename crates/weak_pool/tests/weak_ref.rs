// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the weak-reference handles.

use weak_pool::{Strong, WeakRef};

#[derive(Debug, PartialEq, Eq)]
struct Point3D {
    x: i32,
    y: i32,
    z: i32,
}

#[test]
fn observe_then_outlive() {
    let strong = Strong::new(Point3D { x: 1, y: 2, z: 3 });
    let weak = WeakRef::new(Some(&strong));

    let observed = weak.get().expect("value is strongly held");
    assert_eq!(*observed, Point3D { x: 1, y: 2, z: 3 });

    // The observed handle keeps the value alive past the original.
    drop(strong);
    assert_eq!(observed.x, 1);

    drop(observed);
    for _ in 0..5 {
        assert!(weak.get().is_none(), "deadness is terminal");
    }
}

#[test]
fn dead_on_arrival() {
    let weak: WeakRef<Point3D> = WeakRef::new(None);
    assert!(weak.get().is_none());
}

#[test]
fn strong_clones_share_the_value() {
    let a = Strong::new(vec![1_u8, 2, 3]);
    let b = a.clone();
    assert!(Strong::ptr_eq(&a, &b));
    drop(a);
    assert_eq!(*b, vec![1, 2, 3]);
}

#[test]
fn readers_on_a_live_reference_never_miss() {
    let strong = Strong::new(0xDEAD_BEEF_u64);
    let weak = WeakRef::new(Some(&strong));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..10_000 {
                    let got = weak.get().expect("strongly held throughout");
                    assert_eq!(*got, 0xDEAD_BEEF);
                }
            });
        }
    });
}

#[test]
fn concurrent_death_is_clean() {
    // Readers race the final strong drop; every reader either gets a live
    // value or a definite None, and the reference ends up dead.
    for _ in 0..50 {
        let strong = Strong::new(String::from("ephemeral"));
        let weak = WeakRef::new(Some(&strong));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        if let Some(got) = weak.get() {
                            assert_eq!(*got, "ephemeral");
                        }
                    }
                });
            }
            scope.spawn(move || drop(strong));
        });

        assert!(weak.get().is_none());
    }
}

#[test]
fn weak_handles_travel_across_threads() {
    let strong = Strong::new(7_i64);
    let weak = WeakRef::new(Some(&strong));
    let carried = weak.clone();

    let handle = std::thread::spawn(move || carried.get().map(|v| *v));
    assert_eq!(handle.join().expect("reader thread"), Some(7));

    drop(strong);
    assert!(weak.get().is_none());
}
