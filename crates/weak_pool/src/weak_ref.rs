// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A weak reference that races safely with reclamation.
//!
//! [`Strong<T>`] is an owning, reference-counted handle; [`WeakRef<T>`]
//! observes the referent without keeping it alive. A lookup either returns a
//! live [`Strong<T>`] or a definite `None`, even while the last strong handle
//! is being dropped on another thread.
//!
//! The referent's state word is the lock: `DEAD`, `ALIVE`, or `IN_USE`. A
//! lookup wins `ALIVE -> IN_USE`, revives the strong count, and releases
//! `ALIVE`. The reclamation run triggered by the final strong drop must win
//! the same word before it may drop the value, so it either observes the
//! revived count and leaves the referent alone for another cycle (the rescue)
//! or tears it down with no reader anywhere inside the publication window.
//!
//! The string pool applies the same discipline per table slot, extended with
//! the option states in [`crate::slot`].

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering, fence};
use std::thread;

use crate::slot::{ALIVE, DEAD, IN_USE};

/// Shared box behind [`Strong`] and [`WeakRef`] handles.
///
/// `weak` counts reasons the box itself must stay allocated: one unit per
/// `WeakRef`, one unit held while the value is undropped, and one transient
/// guard per potentially-final strong drop. The box is freed when `weak`
/// reaches zero; the value is dropped earlier, under the state lock.
struct RefBox<T> {
    strong: AtomicUsize,
    weak: AtomicUsize,
    state: AtomicU8,
    value: std::cell::UnsafeCell<ManuallyDrop<T>>,
}

/// An owning handle to a reference-counted value.
///
/// This is the strong side of [`WeakRef`]; the pair exists because the weak
/// side must be able to revive the count from zero inside its lookup window,
/// which rules out the standard library's counted pointers.
pub struct Strong<T> {
    ptr: NonNull<RefBox<T>>,
    _marker: PhantomData<RefBox<T>>,
}

// SAFETY: the box is shared across threads exactly like an Arc allocation;
// the value is only dropped under the state lock with the strong count at
// zero.
unsafe impl<T: Send + Sync> Send for Strong<T> {}
// SAFETY: `&Strong<T>` only hands out `&T` and atomic operations.
unsafe impl<T: Send + Sync> Sync for Strong<T> {}

impl<T> Strong<T> {
    /// Wraps `value` in a fresh reference-counted box.
    #[must_use]
    pub fn new(value: T) -> Self {
        let boxed = Box::new(RefBox {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            state: AtomicU8::new(ALIVE),
            value: std::cell::UnsafeCell::new(ManuallyDrop::new(value)),
        });
        Self {
            ptr: NonNull::from(Box::leak(boxed)),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn shared(&self) -> &RefBox<T> {
        // SAFETY: a strong handle keeps the box allocated.
        unsafe { self.ptr.as_ref() }
    }

    /// Identity comparison: whether two handles share one box.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.ptr == b.ptr
    }
}

impl<T> Clone for Strong<T> {
    fn clone(&self) -> Self {
        self.shared().strong.fetch_add(1, Ordering::Relaxed);
        Self { ptr: self.ptr, _marker: PhantomData }
    }
}

impl<T> Deref for Strong<T> {
    type Target = T;

    fn deref(&self) -> &T {
        let shared = self.shared();
        // SAFETY: the strong count is nonzero while this handle exists, so
        // the value has not been dropped and no exclusive access exists.
        unsafe { &**shared.value.get() }
    }
}

impl<T> Drop for Strong<T> {
    fn drop(&mut self) {
        let shared = self.shared();
        // The guard keeps the box allocated through the reclamation run even
        // if a lookup revives the value and re-drops it concurrently.
        shared.weak.fetch_add(1, Ordering::Relaxed);
        if shared.strong.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            reclaim(self.ptr);
        }
        release_weak(self.ptr);
    }
}

impl<T: fmt::Debug> fmt::Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Strong").field(&**self).finish()
    }
}

/// Runs after a strong count reached zero: tear the value down, unless a
/// lookup revived it first.
fn reclaim<T>(ptr: NonNull<RefBox<T>>) {
    // SAFETY: the caller holds a weak guard, so the box is allocated.
    let shared = unsafe { ptr.as_ref() };
    loop {
        match shared.state.compare_exchange(ALIVE, IN_USE, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                if shared.strong.load(Ordering::Acquire) == 0 {
                    // Nobody revived the value; it goes now, before the word
                    // becomes DEAD and observable.
                    // SAFETY: the state lock is held and the strong count is
                    // zero, so no reference into the value can exist.
                    let value = unsafe { &mut *shared.value.get() };
                    // SAFETY: dropped exactly once, DEAD is terminal.
                    unsafe { ManuallyDrop::drop(value) };
                    shared.state.store(DEAD, Ordering::Release);
                    // The unit held on behalf of the live value.
                    release_weak(ptr);
                } else {
                    // Rescued: a lookup slipped into its window before we
                    // took the lock. The next final drop runs this again.
                    shared.state.store(ALIVE, Ordering::Release);
                }
                return;
            }
            // A revive-and-redrop cycle already tore the value down.
            Err(state) if state == DEAD => return,
            // A lookup holds the publication window; wait it out.
            Err(_) => thread::yield_now(),
        }
    }
}

/// Drops one weak unit; the last unit frees the box.
fn release_weak<T>(ptr: NonNull<RefBox<T>>) {
    // SAFETY: the caller holds a weak unit, so the box is allocated.
    let shared = unsafe { ptr.as_ref() };
    if shared.weak.fetch_sub(1, Ordering::Release) != 1 {
        return;
    }
    fence(Ordering::Acquire);
    // SAFETY: last count of any kind. The value was already dropped when the
    // live-value unit was released, and `RefBox` itself has no drop glue, so
    // reconstituting the Box only frees memory.
    drop(unsafe { Box::from_raw(ptr.as_ptr()) });
}

/// A handle that observes a value without keeping it alive.
///
/// Obtained from a [`Strong<T>`]; [`WeakRef::get`] returns a fresh strong
/// handle while the value lives and `None` forever after it has been
/// reclaimed.
pub struct WeakRef<T> {
    ptr: Option<NonNull<RefBox<T>>>,
    _marker: PhantomData<RefBox<T>>,
}

// SAFETY: same sharing discipline as `Strong<T>`.
unsafe impl<T: Send + Sync> Send for WeakRef<T> {}
// SAFETY: `&WeakRef<T>` exposes only atomic operations.
unsafe impl<T: Send + Sync> Sync for WeakRef<T> {}

impl<T> WeakRef<T> {
    /// Creates a weak reference to `value`'s referent, or a permanently dead
    /// reference for `None`.
    #[must_use]
    pub fn new(value: Option<&Strong<T>>) -> Self {
        match value {
            Some(strong) => {
                strong.shared().weak.fetch_add(1, Ordering::Relaxed);
                Self { ptr: Some(strong.ptr), _marker: PhantomData }
            }
            None => Self { ptr: None, _marker: PhantomData },
        }
    }

    /// Returns a strong handle while the referent lives, `None` once it has
    /// been reclaimed.
    ///
    /// Contention on the publication window is resolved by yielding and
    /// retrying; the call completes as soon as any concurrent holder makes
    /// progress.
    #[must_use]
    pub fn get(&self) -> Option<Strong<T>> {
        self.get_inner(|| {})
    }

    /// Lookup with a caller-controlled pause inside the publication window,
    /// to pin down the race between a suspended reader and the reclamation
    /// run.
    #[cfg(test)]
    pub(crate) fn get_paused(&self, pause: impl FnOnce()) -> Option<Strong<T>> {
        self.get_inner(pause)
    }

    fn get_inner(&self, pause: impl FnOnce()) -> Option<Strong<T>> {
        let ptr = self.ptr?;
        // SAFETY: the weak unit held by this handle keeps the box allocated.
        let shared = unsafe { ptr.as_ref() };
        let mut pause = Some(pause);
        loop {
            match shared.state.compare_exchange(ALIVE, IN_USE, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    if let Some(pause) = pause.take() {
                        pause();
                    }
                    // Inside the window the value cannot be dropped: the
                    // reclamation run needs this word first. Revive the count
                    // and publish a strong handle.
                    shared.strong.fetch_add(1, Ordering::Relaxed);
                    let strong = Strong { ptr, _marker: PhantomData };
                    shared.state.store(ALIVE, Ordering::Release);
                    return Some(strong);
                }
                Err(state) if state == DEAD => return None,
                Err(_) => thread::yield_now(),
            }
        }
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        if let Some(ptr) = self.ptr {
            // SAFETY: our own weak unit keeps the box allocated.
            let shared = unsafe { ptr.as_ref() };
            shared.weak.fetch_add(1, Ordering::Relaxed);
        }
        Self { ptr: self.ptr, _marker: PhantomData }
    }
}

impl<T> Drop for WeakRef<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            release_weak(ptr);
        }
    }
}

impl<T> Default for WeakRef<T> {
    /// A permanently dead reference.
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder.
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.ptr {
            // SAFETY: our weak unit keeps the box allocated.
            Some(ptr) => match unsafe { ptr.as_ref() }.state.load(Ordering::Acquire) {
                DEAD => "dead",
                ALIVE => "alive",
                _ => "in-use",
            },
            None => "dead",
        };
        f.debug_struct("WeakRef").field("state", &state).finish()
    }
}
