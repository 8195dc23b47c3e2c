//! Persistent Group Context
//!
//! Per-group state shared by every packet of the group on every CPU:
//! a bank of sparse counters and a fixed array of spinlock-guarded
//! scratch slots.
//!
//! # Design
//!
//! - Slot memory is one cache line, aligned to 64 bytes
//! - Acquisition spins; critical sections must be short and never sleep
//! - A slot is only reachable through a [`PersistentGuard`], which
//!   releases the lock on drop and cannot leave the acquiring thread

use bytemuck::Pod;
use crossbeam::utils::Backoff;
use fanout_common::{CounterBank, GroupConfig, SparseCounter};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Bytes of scratch memory per slot
pub const MAX_SLOT_BYTES: usize = 64;

#[repr(C, align(64))]
struct SlotMemory([u8; MAX_SLOT_BYTES]);

/// Compile-time check that `T` fits a slot
struct SlotFit<T>(PhantomData<T>);

impl<T> SlotFit<T> {
    const OK: () = assert!(
        size_of::<T>() <= MAX_SLOT_BYTES && align_of::<T>() <= align_of::<SlotMemory>(),
        "persistent type does not fit in a slot"
    );
}

struct PersistentSlot {
    locked: AtomicBool,
    memory: UnsafeCell<SlotMemory>,
}

// SAFETY: `memory` is only reached through a guard holding `locked`.
unsafe impl Sync for PersistentSlot {}

impl PersistentSlot {
    fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            memory: UnsafeCell::new(SlotMemory([0; MAX_SLOT_BYTES])),
        }
    }

    #[inline]
    fn lock(&self) {
        let backoff = Backoff::new();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Locked view of a persistent slot as a `T`
///
/// Dropping the guard releases the slot.
pub struct PersistentGuard<'a, T: Pod> {
    slot: &'a PersistentSlot,
    // !Send: the lock is released by the thread that took it
    _marker: PhantomData<(&'a mut T, *const ())>,
}

impl<'a, T: Pod> PersistentGuard<'a, T> {
    fn new(slot: &'a PersistentSlot) -> Self {
        let () = SlotFit::<T>::OK;
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    fn bytes(&self) -> &[u8] {
        // SAFETY: the slot lock is held for the guard's lifetime.
        let mem = unsafe { &*self.slot.memory.get() };
        &mem.0[..size_of::<T>()]
    }

    #[inline(always)]
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes this the only view.
        let mem = unsafe { &mut *self.slot.memory.get() };
        &mut mem.0[..size_of::<T>()]
    }
}

impl<T: Pod> Deref for PersistentGuard<'_, T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        bytemuck::from_bytes(self.bytes())
    }
}

impl<T: Pod> DerefMut for PersistentGuard<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        bytemuck::from_bytes_mut(self.bytes_mut())
    }
}

impl<T: Pod> Drop for PersistentGuard<'_, T> {
    #[inline(always)]
    fn drop(&mut self) {
        self.slot.unlock();
    }
}

/// Persistent per-group context
pub struct GroupContext {
    counters: CounterBank,
    slots: Box<[PersistentSlot]>,
}

impl GroupContext {
    /// Create a context sized by configuration
    pub fn new(config: &GroupConfig) -> Self {
        Self::with_capacity(config.counters, config.persistent_slots, config.shards())
    }

    /// Create a context with explicit capacities
    pub fn with_capacity(counters: usize, slots: usize, shards: usize) -> Self {
        tracing::debug!(counters, slots, shards, "group context created");
        Self {
            counters: CounterBank::new(counters, shards),
            slots: (0..slots).map(|_| PersistentSlot::new()).collect(),
        }
    }

    /// Counter `n`, `None` when out of range
    #[inline(always)]
    pub fn counter(&self, n: i32) -> Option<&SparseCounter> {
        self.counters.get(n)
    }

    /// Whole counter bank, for statistics readers
    pub fn counters(&self) -> &CounterBank {
        &self.counters
    }

    /// Number of persistent slots
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, n: i32) -> Option<&PersistentSlot> {
        usize::try_from(n).ok().and_then(|i| self.slots.get(i))
    }

    /// Spin until slot `n` is free, then lock it
    #[inline]
    pub fn persistent<T: Pod>(&self, n: i32) -> Option<PersistentGuard<'_, T>> {
        let slot = self.slot(n)?;
        slot.lock();
        Some(PersistentGuard::new(slot))
    }

    /// Lock slot `n` only if nobody holds it
    #[inline]
    pub fn try_persistent<T: Pod>(&self, n: i32) -> Option<PersistentGuard<'_, T>> {
        let slot = self.slot(n)?;
        if !slot.try_lock() {
            return None;
        }
        Some(PersistentGuard::new(slot))
    }

    /// True while some caller holds slot `n`
    pub fn is_locked(&self, n: i32) -> bool {
        self.slot(n)
            .map(|s| s.locked.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for GroupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupContext")
            .field("counters", &self.counters.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}
