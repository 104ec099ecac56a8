// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Weak references and a concurrent weak string-interning pool.
//!
//! This crate provides two closely related primitives:
//!
//! - [`WeakRef<T>`], a weak reference that observes a value without keeping
//!   it alive and races safely with its reclamation: a lookup returns either
//!   a live [`Strong<T>`] handle or a definite `None`, never a dangling
//!   value.
//! - [`StringPool`], an interning pool for byte strings built from the same
//!   per-slot discipline: equal inputs share one canonical [`InternedStr`]
//!   allocation, and entries vanish automatically once no handle retains
//!   them.
//!
//! The pool is made for parsers, tokenizers, and similar workloads that see
//! the same byte sequences over and over: interning collapses them into
//! shared handles with pointer-speed equality, while unreferenced entries
//! are reclaimed instead of accumulating forever.
//!
//! # When to Use
//!
//! - **Tokenizers**: collapse repeated identifiers into shared handles
//! - **Protocol parsers**: intern header names and enum-like string fields
//! - **Caches keyed by strings**: identity comparison instead of byte
//!   comparison on the hot path
//!
//! # Example
//!
//! ```
//! use weak_pool::{InternedStr, StringPool};
//!
//! let pool = StringPool::new();
//!
//! let first = pool.intern(b"content-type");
//! let second = pool.intern(b"content-type");
//! assert!(InternedStr::ptr_eq(&first, &second));
//!
//! // Entries live exactly as long as someone holds them.
//! drop((first, second));
//! assert_eq!(pool.len(), 0);
//! ```
//!
//! # Concurrency
//!
//! Every operation is lock-free in the traditional sense: the only "lock" is
//! a per-slot state word held across a handful of instructions, contention
//! is absorbed by yielding and retrying, and the table doubles online. A
//! resize migrates entries cooperatively across all threads that happen to
//! observe it, while readers keep reading the old table until the flip.
//!
//! # Thread Safety
//!
//! [`StringPool`] is cheap to clone and all clones share storage;
//! [`InternedStr`], [`Strong<T>`], and [`WeakRef<T>`] are `Send + Sync`
//! (the generic handles when `T` is).

mod hash;
mod interned;
mod pool;
mod slot;
mod weak_ref;

pub use hash::fnv1a;
pub use interned::InternedStr;
pub use pool::{INITIAL_CAPACITY, PROBE_LEN, StringPool};
pub use slot::SLOT_SIZE;
pub use weak_ref::{Strong, WeakRef};
