//! Tx worker
//!
//! One pinned thread polling a fixed array of binding slots.
//!
//! # Publication
//!
//! A slot holds a queue index (`-1` when empty) and a producer reference.
//! Binding stores the producer first and publishes the queue index last;
//! the sweep loads the queue index first and the producer after it.
//! Unbinding reverses the order: unpublish, wait for in-flight sweeps,
//! then release the producer.
//!
//! The sweep epoch is odd while a sweep is in flight, which lets unbind
//! wait for exactly the sweep that may still be using a slot.

use crate::producer::TxProducer;
use arc_swap::ArcSwapOption;
use crossbeam::utils::Backoff;
use fanout_common::TxStats;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const EMPTY: isize = -1;

/// Worker lifecycle
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No thread
    Unbound = 0,
    /// Thread created, not yet pinned
    Starting = 1,
    /// Polling
    Running = 2,
    /// Stop requested, finishing the current sweep
    Stopping = 3,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Starting,
            2 => RunState::Running,
            3 => RunState::Stopping,
            _ => RunState::Unbound,
        }
    }
}

struct Bound(Arc<dyn TxProducer>);

/// Producer queue binding
pub(crate) struct BindingSlot {
    queue: AtomicIsize,
    producer: ArcSwapOption<Bound>,
}

impl BindingSlot {
    fn new() -> Self {
        Self {
            queue: AtomicIsize::new(EMPTY),
            producer: ArcSwapOption::empty(),
        }
    }

    #[inline]
    pub(crate) fn is_occupied(&self) -> bool {
        self.queue.load(Ordering::Acquire) != EMPTY
    }

    pub(crate) fn is_bound_to(&self, target: *const ()) -> bool {
        match &*self.producer.load() {
            Some(b) => Arc::as_ptr(&b.0) as *const () == target,
            None => false,
        }
    }

    /// Store the producer, then make the slot visible to the sweep
    pub(crate) fn publish(&self, producer: Arc<dyn TxProducer>, queue: isize) {
        self.producer.store(Some(Arc::new(Bound(producer))));
        self.queue.store(queue, Ordering::SeqCst);
    }

    /// Hide the slot from sweeps that have not reached it yet
    pub(crate) fn unpublish(&self) {
        self.queue.store(EMPTY, Ordering::SeqCst);
    }

    /// Drop the producer reference
    pub(crate) fn release(&self) {
        self.producer.store(None);
    }
}

/// Outcome of one pass over the binding slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Sweep {
    /// At least one slot was occupied
    pub registered: bool,
    /// Items sent during the pass
    pub sent: u64,
}

/// Backoff and heartbeat intervals of the poll loop
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTiming {
    pub idle: Duration,
    pub heartbeat: Duration,
}

/// Leaves the sweep epoch even, also when a producer panics
struct EpochGuard<'a>(&'a AtomicU64);

impl<'a> EpochGuard<'a> {
    fn enter(epoch: &'a AtomicU64) -> Self {
        epoch.fetch_add(1, Ordering::SeqCst);
        Self(epoch)
    }
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tx worker state, shared between the pool and the worker thread
pub(crate) struct TxWorker {
    id: usize,
    cpu: AtomicIsize,
    state: AtomicU8,
    stop: AtomicBool,
    epoch: AtomicU64,
    sent: AtomicU64,
    bindings: Box<[BindingSlot]>,
    pub(crate) thread: Mutex<Option<JoinHandle<()>>>,
}

impl TxWorker {
    pub(crate) fn new(id: usize, queues: usize) -> Self {
        Self {
            id,
            cpu: AtomicIsize::new(-1),
            state: AtomicU8::new(RunState::Unbound as u8),
            stop: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            bindings: (0..queues).map(|_| BindingSlot::new()).collect(),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RunState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn cpu(&self) -> Option<usize> {
        usize::try_from(self.cpu.load(Ordering::Relaxed)).ok()
    }

    pub(crate) fn bindings(&self) -> &[BindingSlot] {
        &self.bindings
    }

    pub(crate) fn free_slot(&self) -> Option<&BindingSlot> {
        self.bindings.iter().find(|s| !s.is_occupied())
    }

    pub(crate) fn occupied(&self) -> usize {
        self.bindings.iter().filter(|s| s.is_occupied()).count()
    }

    /// Completed sweeps
    pub(crate) fn sweeps(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed) / 2
    }

    /// Items sent by this worker
    pub(crate) fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Claim the worker for `cpu` before its thread exists
    pub(crate) fn prepare(&self, cpu: usize) {
        self.cpu.store(cpu as isize, Ordering::Relaxed);
        self.stop.store(false, Ordering::Release);
        self.set_state(RunState::Starting);
    }

    pub(crate) fn request_stop(&self) {
        self.set_state(RunState::Stopping);
        self.stop.store(true, Ordering::Release);
    }

    /// Back to Unbound with every slot empty. Caller holds the pool lock.
    pub(crate) fn reset(&self) {
        for slot in self.bindings.iter() {
            slot.unpublish();
            slot.release();
        }
        self.cpu.store(-1, Ordering::Relaxed);
        self.stop.store(false, Ordering::Release);
        self.set_state(RunState::Unbound);
    }

    /// Wait until no sweep that started before now is still in flight
    pub(crate) fn quiesce(&self) {
        let seen = self.epoch.load(Ordering::SeqCst);
        if seen & 1 == 0 {
            return;
        }
        let backoff = Backoff::new();
        while self.epoch.load(Ordering::SeqCst) == seen {
            backoff.snooze();
        }
    }

    /// One pass over every binding slot
    pub(crate) fn sweep(&self, cpu: usize, global: &TxStats) -> Sweep {
        let _epoch = EpochGuard::enter(&self.epoch);
        let mut out = Sweep::default();

        for slot in self.bindings.iter() {
            let queue = slot.queue.load(Ordering::SeqCst);
            if queue == EMPTY {
                continue;
            }
            // The guard pins the producer for the whole call; unbind's
            // quiesce waits for this sweep before releasing the slot.
            let guard = slot.producer.load();
            let Some(bound) = &*guard else {
                continue;
            };

            out.registered = true;
            let tx = bound.0.queue_xmit(queue as usize, cpu);
            out.sent += tx.ok;

            bound.0.stats().record(tx);
            global.record(tx);
        }

        self.sent.fetch_add(out.sent, Ordering::Relaxed);
        out
    }

    /// Poll loop; returns once a stop is requested
    pub(crate) fn run(&self, cpu: usize, global: &TxStats, timing: LoopTiming) {
        tracing::info!(id = self.id, cpu, "Tx thread started");
        let mut last_ping = Instant::now();

        loop {
            let sweep = self.sweep(cpu, global);

            if self.stop.load(Ordering::Acquire) {
                break;
            }

            if !timing.heartbeat.is_zero() && last_ping.elapsed() >= timing.heartbeat {
                tracing::trace!(
                    id = self.id,
                    cpu,
                    sweeps = self.sweeps(),
                    sent = self.sent(),
                    "Tx thread alive"
                );
                last_ping = Instant::now();
            }

            if sweep.sent == 0 {
                thread::yield_now();
            }
            if !sweep.registered {
                thread::sleep(timing.idle);
            }
        }

        tracing::info!(id = self.id, cpu, "Tx thread stopped");
    }
}
