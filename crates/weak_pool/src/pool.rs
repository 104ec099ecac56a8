// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The concurrent weak string pool.
//!
//! An open-addressed, linearly probed table of weak string slots. Lookup and
//! insert race against each other, against entry reclamation, and against an
//! online resize, coordinated entirely through the per-slot state word and
//! one pool state word; there is no mutex anywhere.
//!
//! # Pool state word
//!
//! Bit 0 names the active table (blue or green); the upper bits carry the
//! resize phase. Readers take the state twice around the table load and
//! retry on disagreement, so a torn observation across a table flip is
//! impossible. During a resize the old table stays active for readers while
//! inserts wait for the pool to return to `OK`.
//!
//! # Resize
//!
//! The first inserter that cannot find a free slot within its probe window
//! wins `OK -> INIT_RESIZE`, allocates the shadow table at twice the size,
//! and publishes `DO_RESIZE`. Every thread that observes `DO_RESIZE` joins
//! the migration: workers claim old-table indices from a shared cursor and
//! relocate entries under `USE_RELOCATE -> USE_DEPRECATED`. The worker whose
//! departure takes the count to zero flips the active color, drops the old
//! table reference (readers still inside hold their own references), and
//! reopens the pool. When some entry could not be placed inside its probe
//! window, the pass instead chains straight into another doubling, so that
//! entries are never resident where a lookup cannot find them.

// Table indices are hashes masked to the table size.
#![expect(
    clippy::cast_possible_truncation,
    reason = "hashes become indices only after masking by the table size"
)]

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;

use arc_swap::ArcSwapOption;

use crate::hash::fnv1a;
use crate::interned::{
    self, HOME_NONE, HOME_ORPHAN, HOME_STATIC, InternedStr, StrHeader, home_color, home_index, home_pack,
};
use crate::slot::{self, Slot};

/// Number of linearly probed slots per search, insert, and verify pass.
///
/// This bound caps per-operation work and implicitly sets the load factor:
/// the table doubles as soon as an insert cannot find a free slot within its
/// window.
pub const PROBE_LEN: usize = 8;

/// Capacity of a freshly created pool.
pub const INITIAL_CAPACITY: usize = 64;

const GREEN: u32 = 0x00;
const BLUE: u32 = 0x01;
const COLOR_MASK: u32 = 0x01;

const OK: u32 = 0x00;
const INIT_RESIZE: u32 = 0x10;
const DO_RESIZE: u32 = 0x20;
const CLEANUP: u32 = 0x30;

#[inline]
const fn color(state: u32) -> u32 {
    state & COLOR_MASK
}

#[inline]
const fn phase(state: u32) -> u32 {
    state & !COLOR_MASK
}

/// One physical table: a contiguous, power-of-two array of slots.
struct Table {
    slots: Box<[Slot]>,
}

impl Table {
    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let slots: Box<[Slot]> = std::iter::repeat_with(Slot::new).take(capacity).collect();
        Self { slots }
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }
}

/// Shared state behind every [`StringPool`] clone and every interned handle.
pub(crate) struct PoolCore {
    /// Active color plus resize phase.
    state: AtomicU32,
    /// Threads currently participating in a migration.
    workers: AtomicU32,
    /// Claim cursor over the old table during migration.
    migrate_next: AtomicUsize,
    /// Set when a migrated entry could not be placed inside its probe
    /// window; forces a chained doubling.
    migrate_overflow: AtomicBool,
    blue: ArcSwapOption<Table>,
    green: ArcSwapOption<Table>,
}

impl PoolCore {
    #[inline]
    fn table_of(&self, color: u32) -> &ArcSwapOption<Table> {
        if color == GREEN { &self.green } else { &self.blue }
    }

    /// Takes a consistent snapshot of the active table: the state word must
    /// read identically on both sides of the table load.
    fn active(&self) -> (arc_swap::Guard<Option<Arc<Table>>>, u32) {
        loop {
            let observed = self.state.load(Ordering::Acquire);
            let table = self.table_of(color(observed)).load();
            if table.is_some() && self.state.load(Ordering::Acquire) == observed {
                return (table, observed);
            }
            thread::yield_now();
        }
    }

    /// Waits for the pool to reopen for inserts, helping any migration met
    /// along the way.
    fn join_or_wait(&self) {
        loop {
            let observed = self.state.load(Ordering::Acquire);
            match phase(observed) {
                OK => return,
                DO_RESIZE => {
                    self.workers.fetch_add(1, Ordering::AcqRel);
                    // The resize may have completed (or been replaced) since
                    // the load; only help when the same word still stands.
                    if self.state.load(Ordering::Acquire) == observed {
                        self.migrate(color(observed));
                    } else {
                        self.leave_migration();
                    }
                }
                _ => thread::yield_now(),
            }
        }
    }

    /// Starts a resize after observing a full probe window, or defers to the
    /// one already running.
    fn grow(&self, observed: u32, current_capacity: usize) {
        debug_assert_eq!(phase(observed), OK);
        let init = color(observed) | INIT_RESIZE;
        if self
            .state
            .compare_exchange(observed, init, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.begin_resize(color(observed), current_capacity * 2);
        } else {
            self.join_or_wait();
        }
    }

    /// Allocates the shadow table and opens the migration. The pool state
    /// must currently be `old_color | INIT_RESIZE`, owned by the caller.
    fn begin_resize(&self, old_color: u32, target_capacity: usize) {
        let shadow = old_color ^ COLOR_MASK;
        self.table_of(shadow).store(Some(Arc::new(Table::with_capacity(target_capacity))));
        self.migrate_next.store(0, Ordering::Relaxed);
        self.migrate_overflow.store(false, Ordering::Relaxed);
        // Count ourselves in before anyone can observe DO_RESIZE, so the
        // migration cannot be declared finished under us.
        self.workers.fetch_add(1, Ordering::AcqRel);
        self.state.store(old_color | DO_RESIZE, Ordering::Release);
        self.migrate(old_color);
    }

    /// Migration worker loop: claim old-table indices until the cursor runs
    /// out, then leave.
    fn migrate(&self, old_color: u32) {
        let old = self.table_of(old_color).load_full().expect("migration source table");
        let new = self
            .table_of(old_color ^ COLOR_MASK)
            .load_full()
            .expect("migration target table");
        loop {
            let index = self.migrate_next.fetch_add(1, Ordering::Relaxed);
            if index >= old.slots.len() {
                break;
            }
            self.migrate_slot(&old.slots[index], &new, old_color ^ COLOR_MASK);
        }
        self.leave_migration();
    }

    /// Drops out of the migration; the departure that takes the worker count
    /// to zero completes the resize.
    fn leave_migration(&self) {
        if self.workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            let observed = self.state.load(Ordering::Acquire);
            if phase(observed) == DO_RESIZE {
                self.finish_resize(color(observed));
            }
        }
    }

    /// Flips the active color, retires the old table, and either reopens the
    /// pool or chains into another doubling.
    fn finish_resize(&self, old_color: u32) {
        let new_color = old_color ^ COLOR_MASK;
        self.state.store(new_color | CLEANUP, Ordering::Release);
        // Readers that still hold the old table keep it alive through their
        // own references; this only severs the pool's edge.
        self.table_of(old_color).store(None);
        if self.migrate_overflow.load(Ordering::Relaxed) {
            // Some entry sits outside its probe window. Double again before
            // letting any insert in; lookups keep working throughout.
            self.state.store(new_color | INIT_RESIZE, Ordering::Release);
            let capacity = self
                .table_of(new_color)
                .load_full()
                .expect("freshly activated table")
                .slots
                .len();
            self.begin_resize(new_color, capacity * 2);
        } else {
            self.state.store(new_color | OK, Ordering::Release);
        }
    }

    /// Moves one old-table slot into the new table.
    fn migrate_slot(&self, src: &Slot, new_table: &Table, new_color: u32) {
        loop {
            let word = src.word(Ordering::Acquire);
            match slot::state_of(word) {
                slot::DEAD => {
                    // Deprecated dead slots carry generation zero.
                    if src.word_cas(word, slot::pack(0, slot::DEAD_DEPRECATED)) {
                        return;
                    }
                }
                slot::ALIVE => {
                    if src.try_lock(word, slot::USE_RELOCATE) {
                        let dest = self.relocate_entry(src, new_table, new_color);
                        // The destination index doubles as the forwarding
                        // generation of the deprecated source.
                        src.release(dest as u64, slot::USE_DEPRECATED);
                        return;
                    }
                }
                // An inserter, reader, or reclaimer owns the slot; it will
                // settle to ALIVE or DEAD.
                _ => thread::yield_now(),
            }
        }
    }

    /// Inserts the entry held under `USE_RELOCATE` into the new table and
    /// returns the index a reader will find it (or its surviving twin) at.
    fn relocate_entry(&self, src: &Slot, new_table: &Table, new_color: u32) -> usize {
        let hash = src.hash();
        let len = src.len();
        let header = NonNull::new(src.str_ptr()).expect("relocating slot holds a canonical string");
        // SAFETY: USE_RELOCATE pins the entry's allocation.
        let bytes = unsafe { std::slice::from_raw_parts(src.bytes_ptr(), len) };

        let mask = new_table.mask();
        let start = (hash as usize) & mask;
        let mut claimed = None;
        let mut index = start;
        for _ in 0..PROBE_LEN {
            let dst = &new_table.slots[index];
            loop {
                let word = dst.word(Ordering::Acquire);
                if slot::state_of(word) != slot::DEAD {
                    break;
                }
                let uid = slot::next_uid();
                if dst.try_claim(word, uid) {
                    claimed = Some((index, uid));
                    break;
                }
            }
            if claimed.is_some() {
                break;
            }
            index = (index + 1) & mask;
        }

        let (dest_index, uid, in_window) = match claimed {
            Some((index, uid)) => (index, uid, true),
            None => {
                // Window exhausted. Park the entry in any free slot and flag
                // the chained doubling that will re-place everything.
                self.migrate_overflow.store(true, Ordering::Relaxed);
                let (index, uid) = claim_anywhere(new_table, start);
                (index, uid, false)
            }
        };

        let dst = &new_table.slots[dest_index];
        dst.set_payload(hash, header.as_ptr(), src.bytes_ptr(), len);
        // The reclamation callback routes through `home`; it must point at
        // the destination before the source starts forwarding.
        // SAFETY: USE_RELOCATE pins the allocation.
        unsafe { header.as_ref() }.home.store(home_pack(new_color, dest_index), Ordering::Release);

        if !in_window {
            dst.release(uid, slot::ALIVE);
            return dest_index;
        }

        dst.release(uid, slot::USE_VERIFY);
        match dedup_window(new_table, start, dest_index, uid, hash, bytes) {
            Survivor::Ours => {
                dst.release(uid, slot::ALIVE);
                dest_index
            }
            Survivor::Other(winner) => {
                // A lower-generation twin was migrated first. This entry
                // loses its slot; outstanding handles stay valid, and the
                // slot's weak unit travels with the orphan until its final
                // drop.
                // SAFETY: USE_RELOCATE on the source pins the allocation.
                unsafe { header.as_ref() }.home.store(HOME_ORPHAN, Ordering::Release);
                dst.clear_payload();
                dst.release(uid, slot::DEAD);
                winner
            }
        }
    }
}

/// Claims any free slot, scanning linearly from `start`. Only used while the
/// table is private to migration workers, where a free slot is guaranteed.
fn claim_anywhere(table: &Table, start: usize) -> (usize, u64) {
    let mask = table.mask();
    let mut index = start;
    loop {
        let dst = &table.slots[index];
        let word = dst.word(Ordering::Acquire);
        if slot::state_of(word) == slot::DEAD {
            let uid = slot::next_uid();
            if dst.try_claim(word, uid) {
                return (index, uid);
            }
            continue;
        }
        index = (index + 1) & mask;
    }
}

enum Survivor {
    Ours,
    Other(usize),
}

/// De-duplicates a freshly written entry against its probe window during
/// migration. Lower generation wins in both directions.
fn dedup_window(table: &Table, start: usize, our_index: usize, our_uid: u64, hash: u64, bytes: &[u8]) -> Survivor {
    let mask = table.mask();
    let mut index = start;
    for _ in 0..PROBE_LEN {
        if index != our_index {
            let sibling = &table.slots[index];
            loop {
                let word = sibling.word(Ordering::Acquire);
                let state = slot::state_of(word);
                let uid = slot::uid_of(word);
                match state {
                    slot::DEAD => break,
                    slot::ALIVE => {
                        if sibling.hash() != hash || sibling.len() != bytes.len() {
                            break;
                        }
                        if !sibling.try_lock(word, slot::USE_READ) {
                            thread::yield_now();
                            continue;
                        }
                        // SAFETY: USE_READ pins the sibling's allocation.
                        let matches = unsafe { sibling.bytes_eq(bytes) };
                        if !matches {
                            sibling.release(uid, slot::ALIVE);
                            break;
                        }
                        if uid < our_uid {
                            sibling.release(uid, slot::ALIVE);
                            return Survivor::Other(index);
                        }
                        force_discard(sibling, uid);
                        break;
                    }
                    slot::USE_WRITE | slot::USE_VERIFY => {
                        if uid > our_uid {
                            // The later writer's own verify pass defers to
                            // us.
                            break;
                        }
                        thread::yield_now();
                    }
                    // Readers and reclaimers settle quickly.
                    _ => thread::yield_now(),
                }
            }
        }
        index = (index + 1) & mask;
    }
    Survivor::Ours
}

/// Evicts a published entry from its slot. Caller holds the slot in
/// `USE_READ`. Outstanding handles stay valid; the entry merely stops being
/// canonical, and the slot's weak unit travels with it as the orphan unit.
fn force_discard(sibling: &Slot, uid: u64) {
    let header = NonNull::new(sibling.str_ptr()).expect("locked slot holds a canonical string");
    // SAFETY: the slot lock pins the allocation.
    unsafe { header.as_ref() }.home.store(HOME_ORPHAN, Ordering::Release);
    sibling.clear_payload();
    sibling.release(uid, slot::DEAD);
}

/// Phase 1: probe the window for a live entry with these bytes, returning a
/// fresh handle on a hit. The byte compare runs inside the `USE_READ` window,
/// where the entry's allocation is pinned.
fn search(table: &Table, hash: u64, bytes: &[u8]) -> Option<InternedStr> {
    let mask = table.mask();
    let mut index = (hash as usize) & mask;
    for _ in 0..PROBE_LEN {
        let candidate = &table.slots[index];
        loop {
            let word = candidate.word(Ordering::Acquire);
            if slot::state_of(word) != slot::ALIVE
                || candidate.hash() != hash
                || candidate.len() != bytes.len()
            {
                break;
            }
            if candidate.try_lock(word, slot::USE_READ) {
                // SAFETY: USE_READ held.
                let matches = unsafe { candidate.bytes_eq(bytes) };
                let found = if matches {
                    let header =
                        NonNull::new(candidate.str_ptr()).expect("alive slot holds a canonical string");
                    // SAFETY: USE_READ held; adoption may resurrect the entry
                    // ahead of a pending reclamation, which the reclaimer
                    // detects under this same lock.
                    Some(unsafe { interned::adopt(header) })
                } else {
                    None
                };
                candidate.release(slot::uid_of(word), slot::ALIVE);
                if found.is_some() {
                    return found;
                }
                break;
            }
            // Another holder owns the publication window; re-read the slot.
            thread::yield_now();
        }
        index = (index + 1) & mask;
    }
    None
}

enum Verdict {
    Keep,
    Adopt(InternedStr),
    Restart,
}

enum InsertOutcome {
    Done(InternedStr),
    TableFull,
    Restart,
}

/// Phase 2: claim a dead slot in the window and publish a fresh entry, then
/// run Phase 3 against the siblings.
fn insert(core: &Arc<PoolCore>, table: &Table, table_color: u32, hash: u64, bytes: &[u8]) -> InsertOutcome {
    let mask = table.mask();
    let start = (hash as usize) & mask;
    let mut index = start;
    for _ in 0..PROBE_LEN {
        let dst = &table.slots[index];
        loop {
            let word = dst.word(Ordering::Acquire);
            if slot::state_of(word) != slot::DEAD {
                break;
            }
            let uid = slot::next_uid();
            if dst.try_claim(word, uid) {
                return publish_and_verify(core, table, table_color, start, index, uid, hash, bytes);
            }
            // Lost the claim race; re-examine the same slot.
        }
        index = (index + 1) & mask;
    }
    InsertOutcome::TableFull
}

#[expect(clippy::too_many_arguments, reason = "internal protocol step, all parameters are the claim context")]
fn publish_and_verify(
    core: &Arc<PoolCore>,
    table: &Table,
    table_color: u32,
    start: usize,
    index: usize,
    uid: u64,
    hash: u64,
    bytes: &[u8],
) -> InsertOutcome {
    let dst = &table.slots[index];
    let header = interned::alloc_entry(Arc::clone(core), home_pack(table_color, index), hash, bytes);
    dst.set_payload(hash, header.as_ptr(), interned::data_ptr(header), bytes.len());
    dst.release(uid, slot::USE_VERIFY);
    let handle = interned::from_new(header);

    match verify_window(table, start, index, uid, hash, bytes) {
        Verdict::Keep => {
            dst.release(uid, slot::ALIVE);
            InsertOutcome::Done(handle)
        }
        Verdict::Adopt(existing) => {
            discard_unpublished(dst, uid, header);
            drop(handle);
            InsertOutcome::Done(existing)
        }
        Verdict::Restart => {
            discard_unpublished(dst, uid, header);
            drop(handle);
            InsertOutcome::Restart
        }
    }
}

/// Retracts an entry that was never published as ALIVE. Caller holds the slot
/// in `USE_VERIFY` and a handle on the entry, so no reader can have adopted
/// it; dropping that handle releases the orphan unit and frees the entry.
fn discard_unpublished(dst: &Slot, uid: u64, header: NonNull<StrHeader>) {
    // SAFETY: the caller's handle pins the allocation.
    unsafe { header.as_ref() }.home.store(HOME_ORPHAN, Ordering::Release);
    dst.clear_payload();
    dst.release(uid, slot::DEAD);
}

/// Phase 3: de-duplicate our freshly written entry against every sibling in
/// the window. The lower generation wins deterministically in both
/// directions; a window being rewritten by a migration forces a restart.
fn verify_window(table: &Table, start: usize, our_index: usize, our_uid: u64, hash: u64, bytes: &[u8]) -> Verdict {
    let mask = table.mask();
    let mut index = start;
    for _ in 0..PROBE_LEN {
        if index != our_index {
            let sibling = &table.slots[index];
            loop {
                let word = sibling.word(Ordering::Acquire);
                let state = slot::state_of(word);
                let uid = slot::uid_of(word);
                match state {
                    slot::DEAD => break,
                    slot::USE_DEPRECATED | slot::DEAD_DEPRECATED | slot::USE_RELOCATE => {
                        // A resize is rewriting this window under us.
                        return Verdict::Restart;
                    }
                    slot::ALIVE => {
                        if sibling.hash() != hash || sibling.len() != bytes.len() {
                            break;
                        }
                        if !sibling.try_lock(word, slot::USE_READ) {
                            thread::yield_now();
                            continue;
                        }
                        // SAFETY: USE_READ pins the sibling's allocation.
                        let matches = unsafe { sibling.bytes_eq(bytes) };
                        if !matches {
                            sibling.release(uid, slot::ALIVE);
                            break;
                        }
                        if uid < our_uid {
                            // The older entry is canonical; hand it out.
                            let header = NonNull::new(sibling.str_ptr())
                                .expect("alive slot holds a canonical string");
                            // SAFETY: USE_READ held on the sibling.
                            let existing = unsafe { interned::adopt(header) };
                            sibling.release(uid, slot::ALIVE);
                            return Verdict::Adopt(existing);
                        }
                        // A later writer finished a verify pass that could
                        // not yet see us; lower generation still wins.
                        force_discard(sibling, uid);
                        break;
                    }
                    slot::USE_WRITE | slot::USE_VERIFY => {
                        if uid > our_uid {
                            // The later writer's verify defers to us.
                            break;
                        }
                        thread::yield_now();
                    }
                    // Readers and reclaimers settle quickly.
                    _ => thread::yield_now(),
                }
            }
        }
        index = (index + 1) & mask;
    }
    Verdict::Keep
}

/// Reclamation callback of a pooled entry, run by the handle drop that takes
/// the strong count to zero. The caller holds a weak guard on the
/// allocation.
pub(crate) fn reclaim_entry(header: NonNull<StrHeader>) {
    // SAFETY: the caller holds a weak guard.
    let entry = unsafe { header.as_ref() };
    let Some(core) = entry.pool.as_ref() else {
        return;
    };
    loop {
        let home = entry.home.load(Ordering::Acquire);
        if home == HOME_NONE || home == HOME_STATIC {
            return;
        }
        if home == HOME_ORPHAN {
            // The entry was evicted from its slot with handles outstanding;
            // the last one out releases the unit the slot used to hold.
            // Winning the transition guards against a reclamation run that
            // overlapped a revive-and-redrop cycle.
            if entry.strong.load(Ordering::Acquire) == 0
                && entry
                    .home
                    .compare_exchange(HOME_ORPHAN, HOME_NONE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                interned::release_weak(header);
            }
            return;
        }
        let Some(table) = core.table_of(home_color(home)).load_full() else {
            thread::yield_now();
            continue;
        };
        let index = home_index(home);
        if index >= table.slots.len() {
            thread::yield_now();
            continue;
        }
        let slot_ref = &table.slots[index];
        let word = slot_ref.word(Ordering::Acquire);
        if !std::ptr::eq(slot_ref.str_ptr(), header.as_ptr()) {
            // The home moved under us (migration or eviction); re-read it.
            thread::yield_now();
            continue;
        }
        if slot::state_of(word) == slot::ALIVE {
            if slot_ref.try_lock(word, slot::USE_GC) {
                if entry.strong.load(Ordering::Acquire) == 0 {
                    entry.home.store(HOME_NONE, Ordering::Release);
                    slot_ref.clear_payload();
                    slot_ref.release(slot::uid_of(word), slot::DEAD);
                    interned::release_weak(header);
                } else {
                    // Rescued: a lookup revived the entry from its USE_READ
                    // window. It survives this cycle; the next final drop
                    // runs the callback again.
                    slot_ref.release(slot::uid_of(word), slot::ALIVE);
                }
                return;
            }
            // A reader holds the publication window; observe its release.
            thread::yield_now();
        } else {
            // Relocation or another lock in flight; the home settles or
            // moves.
            thread::yield_now();
        }
    }
}

/// A concurrent weak string-interning pool.
///
/// `intern` returns a canonical [`InternedStr`] per distinct byte string:
/// equal inputs share one allocation (compare with [`InternedStr::ptr_eq`])
/// for as long as any handle is held, and entries whose last handle drops are
/// reclaimed automatically. Clones of the pool share the same storage.
///
/// # Examples
///
/// ```
/// use weak_pool::StringPool;
///
/// let pool = StringPool::new();
/// let a = pool.intern(b"token");
/// let b = pool.intern(b"token");
/// assert!(weak_pool::InternedStr::ptr_eq(&a, &b));
/// assert_eq!(pool.len(), 1);
/// drop((a, b));
/// assert_eq!(pool.len(), 0);
/// ```
pub struct StringPool {
    core: Arc<PoolCore>,
}

impl StringPool {
    /// Creates an empty pool with [`INITIAL_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        let core = PoolCore {
            state: AtomicU32::new(BLUE | OK),
            workers: AtomicU32::new(0),
            migrate_next: AtomicUsize::new(0),
            migrate_overflow: AtomicBool::new(false),
            blue: ArcSwapOption::from(Some(Arc::new(Table::with_capacity(INITIAL_CAPACITY)))),
            green: ArcSwapOption::empty(),
        };
        Self { core: Arc::new(core) }
    }

    /// Interns `bytes`, returning the canonical handle for that byte string.
    ///
    /// Empty input returns the canonical empty handle. The call never fails;
    /// contention and concurrent resizes are absorbed by yielding and
    /// retrying internally.
    #[must_use]
    pub fn intern(&self, bytes: &[u8]) -> InternedStr {
        if bytes.is_empty() {
            return interned::empty_handle();
        }
        let hash = fnv1a(bytes);
        loop {
            let (guard, observed) = self.core.active();
            let table = guard.as_ref().expect("active snapshot holds a table");
            if let Some(existing) = search(table, hash, bytes) {
                return existing;
            }
            // Lookups run during a resize; inserts wait for a quiescent
            // pool observed unchanged since the table snapshot.
            if phase(observed) != OK || self.core.state.load(Ordering::Acquire) != observed {
                self.core.join_or_wait();
                continue;
            }
            match insert(&self.core, table, color(observed), hash, bytes) {
                InsertOutcome::Done(handle) => return handle,
                InsertOutcome::TableFull => self.core.grow(observed, table.slots.len()),
                InsertOutcome::Restart => self.core.join_or_wait(),
            }
        }
    }

    /// Interns a UTF-8 string.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    #[must_use]
    pub fn intern_str(&self, value: &str) -> InternedStr {
        self.intern(value.as_bytes())
    }

    /// Whether `bytes` is currently interned. Search only: a miss never
    /// inserts, and the answer is already stale when it returns.
    #[must_use]
    pub fn contains(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        let hash = fnv1a(bytes);
        loop {
            let (guard, observed) = self.core.active();
            let table = guard.as_ref().expect("active snapshot holds a table");
            if let Some(found) = search(table, hash, bytes) {
                drop(found);
                return true;
            }
            // A state change under the probe may have hidden the entry;
            // retry on a stable snapshot.
            if self.core.state.load(Ordering::Acquire) == observed {
                return false;
            }
        }
    }

    /// Estimated number of live entries: a non-atomic scan of the active
    /// table, for diagnostics only.
    #[must_use]
    pub fn len(&self) -> usize {
        let (guard, _) = self.core.active();
        let table = guard.as_ref().expect("active snapshot holds a table");
        table
            .slots
            .iter()
            .filter(|s| slot::state_of(s.word(Ordering::Acquire)) == slot::ALIVE)
            .count()
    }

    /// Whether the estimate in [`StringPool::len`] is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the active table.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let (guard, _) = self.core.active();
        guard.as_ref().expect("active snapshot holds a table").slots.len()
    }
}

impl Clone for StringPool {
    /// A clone shares the pool's storage.
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

impl Default for StringPool {
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
