//! Sparse Counters
//!
//! Lock-free, per-CPU sharded counters for packet-rate accounting.
//!
//! # Design
//!
//! - One cache-line padded shard per CPU, so CPUs incrementing the same
//!   logical counter never share a line
//! - `add` is a single relaxed `fetch_add` on the caller's shard
//! - `read` sums every shard; concurrent adds may be missed but are never
//!   counted twice
//! - No subtraction and no reset: counters are monotonic for their lifetime

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default shard count: one per available CPU
pub fn default_shards() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

static NEXT_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: usize = NEXT_HINT.fetch_add(1, Ordering::Relaxed);
}

#[inline(always)]
fn shard_hint() -> usize {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sched_getcpu has no preconditions.
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu >= 0 {
            return cpu as usize;
        }
    }
    SHARD_HINT.with(|h| *h)
}

/// Per-CPU sharded monotonic counter
pub struct SparseCounter {
    shards: Box<[CachePadded<AtomicU64>]>,
}

impl SparseCounter {
    /// Create a counter with one shard per available CPU
    pub fn new() -> Self {
        Self::with_shards(default_shards())
    }

    /// Create a counter with an explicit shard count (at least one)
    pub fn with_shards(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| CachePadded::new(AtomicU64::new(0)))
            .collect();
        Self { shards }
    }

    /// Add `n` to the calling CPU's shard
    #[inline(always)]
    pub fn add(&self, n: u64) {
        let idx = shard_hint() % self.shards.len();
        self.shards[idx].fetch_add(n, Ordering::Relaxed);
    }

    /// Add one
    #[inline(always)]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Aggregate value across all shards
    pub fn read(&self) -> u64 {
        self.shards
            .iter()
            .fold(0u64, |acc, s| acc.wrapping_add(s.load(Ordering::Relaxed)))
    }

    /// Number of shards
    pub fn shards(&self) -> usize {
        self.shards.len()
    }
}

impl Default for SparseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SparseCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseCounter")
            .field("value", &self.read())
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Fixed-size bank of sparse counters
#[derive(Debug)]
pub struct CounterBank {
    counters: Box<[SparseCounter]>,
}

impl CounterBank {
    /// Create `len` counters with `shards` shards each
    pub fn new(len: usize, shards: usize) -> Self {
        let counters = (0..len).map(|_| SparseCounter::with_shards(shards)).collect();
        Self { counters }
    }

    /// Counter `n`, or `None` when `n` is negative or past the end
    #[inline]
    pub fn get(&self, n: i32) -> Option<&SparseCounter> {
        usize::try_from(n).ok().and_then(|i| self.counters.get(i))
    }

    /// Number of counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// True if the bank holds no counters
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Aggregated value of every counter
    pub fn snapshot(&self) -> Vec<u64> {
        self.counters.iter().map(SparseCounter::read).collect()
    }
}

/// Outcome of one transmit call on a producer queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxResponse {
    /// Items transmitted
    pub ok: u64,
    /// Items that failed to transmit
    pub fail: u64,
}

impl TxResponse {
    /// Build a response
    pub const fn new(ok: u64, fail: u64) -> Self {
        Self { ok, fail }
    }
}

/// Transmit statistics (sent / failed)
#[derive(Debug, Default)]
pub struct TxStats {
    /// Items sent
    pub sent: SparseCounter,
    /// Items that failed
    pub fail: SparseCounter,
}

impl TxStats {
    /// Create stats with an explicit shard count
    pub fn with_shards(shards: usize) -> Self {
        Self {
            sent: SparseCounter::with_shards(shards),
            fail: SparseCounter::with_shards(shards),
        }
    }

    /// Account a transmit response
    #[inline(always)]
    pub fn record(&self, tx: TxResponse) {
        self.sent.add(tx.ok);
        self.fail.add(tx.fail);
    }

    /// Aggregated snapshot
    pub fn snapshot(&self) -> TxStatsSnapshot {
        TxStatsSnapshot {
            sent: self.sent.read(),
            fail: self.fail.read(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStatsSnapshot {
    /// Items sent
    pub sent: u64,
    /// Items that failed
    pub fail: u64,
}

impl TxStatsSnapshot {
    /// Fraction of attempts that failed
    pub fn failure_rate(&self) -> f64 {
        let total = self.sent + self.fail;
        if total == 0 {
            return 0.0;
        }
        self.fail as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sparse_counter() {
        let c = SparseCounter::with_shards(4);
        c.inc();
        c.add(41);
        assert_eq!(c.read(), 42);
        assert_eq!(c.shards(), 4);
    }

    #[test]
    fn test_zero_shards_clamped() {
        let c = SparseCounter::with_shards(0);
        c.add(3);
        assert_eq!(c.shards(), 1);
        assert_eq!(c.read(), 3);
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let c = Arc::new(SparseCounter::with_shards(3));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        c.inc();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.read(), 80_000);
    }

    #[test]
    fn test_bank_bounds() {
        let bank = CounterBank::new(4, 2);
        assert!(bank.get(-1).is_none());
        assert!(bank.get(0).is_some());
        assert!(bank.get(3).is_some());
        assert!(bank.get(4).is_none());
        assert!(bank.get(i32::MIN).is_none());

        bank.get(2).unwrap().add(7);
        assert_eq!(bank.snapshot(), vec![0, 0, 7, 0]);
    }

    #[test]
    fn test_tx_stats() {
        let stats = TxStats::with_shards(2);
        stats.record(TxResponse::new(5, 0));
        stats.record(TxResponse::new(3, 2));

        let snap = stats.snapshot();
        assert_eq!(snap, TxStatsSnapshot { sent: 8, fail: 2 });
        assert!((snap.failure_rate() - 0.2).abs() < f64::EPSILON);
        assert_eq!(TxStatsSnapshot::default().failure_rate(), 0.0);
    }
}
