// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical string storage and the [`InternedStr`] handle.
//!
//! Every distinct byte string owned by a pool lives in a single heap
//! allocation: a header (reference counts, owning pool, home locator, hash,
//! length) followed inline by the bytes. Pool slots store raw addresses into
//! this allocation; the only ownership edges are the strong count carried by
//! handles and the weak units described below.
//!
//! # Counts
//!
//! - `strong` counts live [`InternedStr`] handles. The drop that takes it to
//!   zero runs the pool's reclamation protocol, which may be overruled by a
//!   concurrent lookup resurrecting the entry from its `USE_READ` window.
//! - `weak` counts reasons the allocation itself must stay: one unit held by
//!   the owning slot until the entry is torn down, plus one transient guard
//!   per potentially-final drop, so overlapping reclamation attempts never
//!   race on freed memory. The allocation is released when `weak` reaches
//!   zero.

#![expect(
    clippy::cast_possible_truncation,
    reason = "home locators pack a color bit and a table index into 64 bits"
)]

use std::alloc::{Layout, alloc, dealloc};
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};

use crate::hash::FNV1A_SEED;
use crate::pool::PoolCore;

/// Home locator of a fully torn-down entry: the slot's weak unit has been
/// released and reclamation has nothing left to do.
pub(crate) const HOME_NONE: u64 = u64::MAX;
/// Home locator of the static empty string; clone and drop are no-ops on it.
pub(crate) const HOME_STATIC: u64 = u64::MAX - 1;
/// Home locator of an entry evicted from its slot while handles were still
/// outstanding (a de-duplication loser). The slot's weak unit travels with
/// the entry and is released by the final drop, which wins the
/// `HOME_ORPHAN -> HOME_NONE` transition exactly once.
pub(crate) const HOME_ORPHAN: u64 = u64::MAX - 2;

/// Packs a table color and slot index into a home locator.
#[inline]
#[must_use]
pub(crate) const fn home_pack(color: u32, index: usize) -> u64 {
    ((color as u64) << 63) | index as u64
}

#[inline]
#[must_use]
pub(crate) const fn home_color(home: u64) -> u32 {
    (home >> 63) as u32
}

#[inline]
#[must_use]
pub(crate) const fn home_index(home: u64) -> usize {
    (home & !(1u64 << 63)) as usize
}

/// Header of a canonical string allocation. The bytes follow inline.
#[repr(C)]
pub(crate) struct StrHeader {
    /// Live handle count.
    pub(crate) strong: AtomicUsize,
    /// Allocation-lifetime count: slot unit plus reclamation guards.
    pub(crate) weak: AtomicUsize,
    /// Current slot of this entry: color and index, or a sentinel. Updated
    /// by insert and by migration before the source slot is deprecated.
    pub(crate) home: AtomicU64,
    /// FNV-1a/64 of the bytes.
    pub(crate) hash: u64,
    /// Byte length.
    pub(crate) len: usize,
    /// The owning pool, kept alive for the reclamation callback. `None` only
    /// for the static empty string.
    pub(crate) pool: Option<Arc<PoolCore>>,
}

/// Byte offset of the inline data; the tail needs no padding after the
/// header.
const fn data_offset() -> usize {
    std::mem::size_of::<StrHeader>()
}

fn layout_of(len: usize) -> Layout {
    let bytes = Layout::array::<u8>(len).expect("byte tail layout");
    let (layout, offset) = Layout::new::<StrHeader>().extend(bytes).expect("entry layout");
    debug_assert_eq!(offset, data_offset());
    layout.pad_to_align()
}

/// The canonical empty string. Never reclaimed, shared by every pool.
static EMPTY: StrHeader = StrHeader {
    strong: AtomicUsize::new(1),
    weak: AtomicUsize::new(1),
    home: AtomicU64::new(HOME_STATIC),
    hash: FNV1A_SEED,
    len: 0,
    pool: None,
};

/// Returns the canonical empty handle.
pub(crate) fn empty_handle() -> InternedStr {
    InternedStr { header: NonNull::from(&EMPTY) }
}

/// Allocates a fresh canonical string with one strong count (the caller's
/// handle) and one weak unit (the owning slot's).
///
/// # Panics
///
/// Panics when the global allocator fails; allocation failure is fatal here.
pub(crate) fn alloc_entry(pool: Arc<PoolCore>, home: u64, hash: u64, bytes: &[u8]) -> NonNull<StrHeader> {
    debug_assert!(!bytes.is_empty());
    let layout = layout_of(bytes.len());
    // SAFETY: the layout is non-zero, it covers at least the header.
    let raw = unsafe { alloc(layout) };
    let header = NonNull::new(raw.cast::<StrHeader>())
        .expect("we do not intend to handle failed allocations - they are fatal");
    let value = StrHeader {
        strong: AtomicUsize::new(1),
        weak: AtomicUsize::new(1),
        home: AtomicU64::new(home),
        hash,
        len: bytes.len(),
        pool: Some(pool),
    };
    // SAFETY: `header` points at freshly allocated, properly aligned storage
    // for a `StrHeader`.
    unsafe { header.write(value) };
    // SAFETY: the allocation extends `data_offset() + bytes.len()` bytes past
    // the base by construction of the layout.
    let dst = unsafe { raw.add(data_offset()) };
    // SAFETY: source and destination are valid for `bytes.len()` bytes and
    // cannot overlap, the destination was just allocated.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
    header
}

/// Returns the address of the entry's first byte.
pub(crate) fn data_ptr(header: NonNull<StrHeader>) -> *mut u8 {
    // SAFETY: the tail directly follows the header inside one allocation.
    unsafe { header.as_ptr().cast::<u8>().add(data_offset()) }
}

/// Drops one weak unit; the last unit frees the allocation.
pub(crate) fn release_weak(header: NonNull<StrHeader>) {
    // SAFETY: the caller holds a weak unit, so the allocation is live.
    let h = unsafe { header.as_ref() };
    if h.weak.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    // Make every access from other weak holders visible before the free.
    fence(Ordering::Acquire);
    let layout = layout_of(h.len);
    let base = header.as_ptr();
    // SAFETY: this was the last count of any kind; nothing can reach the
    // allocation anymore.
    let pool_field = unsafe { &raw mut (*base).pool };
    // SAFETY: the field is initialized and never touched again.
    unsafe { std::ptr::drop_in_place(pool_field) };
    // SAFETY: the allocation was produced by `alloc_entry` with this exact
    // layout.
    unsafe { dealloc(base.cast::<u8>(), layout) };
}

/// Creates a handle for a freshly allocated entry whose strong count already
/// includes it.
pub(crate) fn from_new(header: NonNull<StrHeader>) -> InternedStr {
    InternedStr { header }
}

/// Creates a handle for an existing entry, bumping the strong count. This
/// can resurrect the entry from zero ahead of a pending reclamation, which
/// the reclamation protocol detects under the slot lock.
///
/// # Safety
///
/// The caller must hold the entry's slot in a `USE_*` state; the lock is what
/// keeps the allocation live while the count is taken.
pub(crate) unsafe fn adopt(header: NonNull<StrHeader>) -> InternedStr {
    // SAFETY: the slot lock held by the caller pins the allocation.
    let h = unsafe { header.as_ref() };
    h.strong.fetch_add(1, Ordering::Relaxed);
    InternedStr { header }
}

/// A canonical, reference-counted handle to a pooled byte string.
///
/// Handles compare equal by byte content; [`InternedStr::ptr_eq`] exposes the
/// identity guarantee (two interns of equal bytes in one pool share a single
/// allocation once the pool has quiesced). Dropping the last handle of an
/// entry reclaims its pool slot.
pub struct InternedStr {
    header: NonNull<StrHeader>,
}

// SAFETY: the pointee is shared immutable byte data plus atomics; all
// mutation goes through the atomic reclamation protocol.
unsafe impl Send for InternedStr {}
// SAFETY: as above, `&InternedStr` exposes only immutable bytes and atomics.
unsafe impl Sync for InternedStr {}

impl InternedStr {
    #[inline]
    fn header(&self) -> &StrHeader {
        // SAFETY: a handle holds a strong count, so the allocation is live.
        unsafe { self.header.as_ref() }
    }

    /// The interned bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let h = self.header();
        if h.len == 0 {
            return &[];
        }
        let data = data_ptr(self.header);
        // SAFETY: `len` bytes are valid at the tail for as long as the handle
        // lives.
        unsafe { std::slice::from_raw_parts(data, h.len) }
    }

    /// The interned bytes as UTF-8, when they are valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Byte length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header().len
    }

    /// Whether this is the canonical empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header().len == 0
    }

    /// The entry's FNV-1a/64 hash, as stored in its slot.
    #[must_use]
    pub fn hash64(&self) -> u64 {
        self.header().hash
    }

    /// Identity comparison: whether two handles share one allocation.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.header == b.header
    }
}

impl Clone for InternedStr {
    fn clone(&self) -> Self {
        let h = self.header();
        if h.home.load(Ordering::Relaxed) != HOME_STATIC {
            h.strong.fetch_add(1, Ordering::Relaxed);
        }
        Self { header: self.header }
    }
}

impl Drop for InternedStr {
    fn drop(&mut self) {
        let h = self.header();
        if h.home.load(Ordering::Relaxed) == HOME_STATIC {
            return;
        }
        // The guard keeps the allocation through the reclamation run even if
        // a resurrect-and-redrop cycle tears the entry down concurrently.
        h.weak.fetch_add(1, Ordering::Relaxed);
        if h.strong.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            crate::pool::reclaim_entry(self.header);
        }
        release_weak(self.header);
    }
}

impl Deref for InternedStr {
    type Target = [u8];

    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for InternedStr {
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for InternedStr {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || self.as_bytes() == other.as_bytes()
    }
}

impl Eq for InternedStr {}

impl std::hash::Hash for InternedStr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for InternedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InternedStr").field(&String::from_utf8_lossy(self.as_bytes())).finish()
    }
}

impl fmt::Display for InternedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}
