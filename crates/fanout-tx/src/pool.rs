//! Tx thread pool
//!
//! Fixed-capacity set of Tx workers, one per configured CPU.
//!
//! Bind and unbind mutate binding slots under one pool-wide lock; the
//! workers read the slots without it. Start and stop are serialized by a
//! second lock so that a slow stop never holds up bind/unbind callers.

use crate::affinity::{check_affinity, CpuTopology, SystemTopology};
use crate::producer::TxProducer;
use crate::worker::{LoopTiming, RunState, TxWorker};
use crossbeam::channel::bounded;
use fanout_common::{FanoutError, FanoutResult, TxPoolConfig, TxStats, TxStatsSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Point-in-time view of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Worker id (position in the CPU list)
    pub id: usize,
    /// Pinned CPU, `None` when unbound
    pub cpu: Option<usize>,
    /// Lifecycle state
    pub state: RunState,
    /// Occupied binding slots
    pub occupied: usize,
    /// Completed sweeps
    pub sweeps: u64,
    /// Items sent since creation
    pub sent: u64,
}

/// Pool of CPU-pinned Tx threads
pub struct TxThreadPool {
    config: TxPoolConfig,
    workers: Box<[Arc<TxWorker>]>,
    lock: Mutex<()>,
    lifecycle: Mutex<()>,
    global: Arc<TxStats>,
    topology: Arc<dyn CpuTopology>,
}

impl TxThreadPool {
    /// Create a pool on the host topology
    pub fn new(config: TxPoolConfig) -> FanoutResult<Self> {
        Self::with_topology(config, Arc::new(SystemTopology))
    }

    /// Create a pool on an explicit topology
    pub fn with_topology(config: TxPoolConfig, topology: Arc<dyn CpuTopology>) -> FanoutResult<Self> {
        config.validate()?;

        let workers = (0..config.workers())
            .map(|id| Arc::new(TxWorker::new(id, config.queues_per_worker)))
            .collect();

        Ok(Self {
            config,
            workers,
            lock: Mutex::new(()),
            lifecycle: Mutex::new(()),
            global: Arc::new(TxStats::default()),
            topology,
        })
    }

    /// Configured number of workers
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Binding slots per worker
    pub fn queues_per_worker(&self) -> usize {
        self.config.queues_per_worker
    }

    /// Check the configured CPU list against the topology
    pub fn check_affinity(&self) -> FanoutResult<()> {
        check_affinity(&self.config.tx_cpus, &*self.topology)
    }

    /// Start one worker per configured CPU, in order.
    ///
    /// Affinity is validated first; on a violation nothing is started.
    /// If creating a worker fails, the workers already running are left
    /// running and the failure is returned wrapped in
    /// [`FanoutError::PartialStart`] (or as is, when it was the first one).
    pub fn start(&self) -> FanoutResult<usize> {
        let _lifecycle = self.lifecycle.lock();

        if self.workers.iter().any(|w| w.state() != RunState::Unbound) {
            return Err(FanoutError::AlreadyRunning);
        }

        self.check_affinity()?;

        let requested = self.workers.len();
        if requested == 0 {
            return Ok(0);
        }
        tracing::info!(workers = requested, "starting Tx threads");

        for (started, (worker, &cpu)) in self.workers.iter().zip(&self.config.tx_cpus).enumerate() {
            if let Err(err) = self.spawn(worker, cpu) {
                tracing::error!(id = worker.id(), cpu, error = %err, "Tx thread create failed");
                if started == 0 {
                    return Err(err);
                }
                return Err(FanoutError::PartialStart {
                    started,
                    requested,
                    source: Box::new(err),
                });
            }
        }

        Ok(requested)
    }

    fn spawn(&self, worker: &Arc<TxWorker>, cpu: usize) -> FanoutResult<()> {
        worker.prepare(cpu);

        let (ready_tx, ready_rx) = bounded(1);
        let thread_worker = worker.clone();
        let global = self.global.clone();
        let topology = self.topology.clone();
        let timing = LoopTiming {
            idle: self.config.idle_sleep(),
            heartbeat: self.config.heartbeat(),
        };

        // Pin before reporting ready: a worker is never Running off its CPU,
        // and what the loop allocates is first touched there.
        let spawned = thread::Builder::new()
            .name(format!("fanout-tx/{}", cpu))
            .spawn(move || {
                if !topology.pin_current(cpu) {
                    let _ = ready_tx.send(false);
                    return;
                }
                thread_worker.set_state(RunState::Running);
                let _ = ready_tx.send(true);
                thread_worker.run(cpu, &global, timing);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                worker.reset();
                return Err(FanoutError::SpawnFailed {
                    cpu,
                    reason: e.to_string(),
                });
            }
        };

        if ready_rx.recv().unwrap_or(false) {
            *worker.thread.lock() = Some(handle);
            tracing::debug!(id = worker.id(), cpu, "created Tx thread");
            Ok(())
        } else {
            let _ = handle.join();
            worker.reset();
            Err(FanoutError::PinFailed { cpu })
        }
    }

    /// Stop every running worker and clear its bindings.
    ///
    /// Blocks until each worker has finished its current sweep.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();

        let running: Vec<_> = self
            .workers
            .iter()
            .filter(|w| w.state() == RunState::Running)
            .collect();
        if running.is_empty() {
            return;
        }
        tracing::info!(workers = running.len(), "stopping Tx threads");

        for worker in running {
            worker.request_stop();
            if let Some(handle) = worker.thread.lock().take() {
                if handle.join().is_err() {
                    tracing::warn!(id = worker.id(), "Tx thread panicked");
                }
            }

            let _guard = self.lock.lock();
            worker.reset();
        }
    }

    /// True if any worker is running
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|w| w.state() == RunState::Running)
    }

    /// Bind `queue` of `producer` to worker `worker_id`.
    ///
    /// Fails with [`FanoutError::WorkerNotFound`] past the pool size and with
    /// [`FanoutError::WorkerBusy`] when every slot of the worker is taken.
    pub fn bind(&self, worker_id: usize, producer: Arc<dyn TxProducer>, queue: usize) -> FanoutResult<()> {
        let Some(worker) = self.workers.get(worker_id) else {
            tracing::warn!(
                id = worker_id,
                workers = self.workers.len(),
                "Tx thread not available"
            );
            return Err(FanoutError::WorkerNotFound(worker_id));
        };
        let queue_index = isize::try_from(queue)
            .map_err(|_| FanoutError::Config(format!("queue index {} out of range", queue)))?;

        let _guard = self.lock.lock();

        let Some(slot) = worker.free_slot() else {
            tracing::warn!(id = worker_id, "Tx thread busy (no queue available)");
            return Err(FanoutError::WorkerBusy(worker_id));
        };

        let producer_id = producer.id();
        slot.publish(producer, queue_index);

        tracing::debug!(id = worker_id, producer = producer_id, queue, "Tx thread bound");
        Ok(())
    }

    /// Remove every binding of `producer` from every worker.
    ///
    /// Each slot is unpublished, then the grace period elapses and any sweep
    /// that was in flight is waited out before the reference is released.
    /// Once this returns no worker calls into `producer` any more.
    /// Returns the number of slots released.
    pub fn unbind(&self, producer: &dyn TxProducer) -> usize {
        let target = producer as *const dyn TxProducer as *const ();
        let grace = self.config.grace_period();

        let _guard = self.lock.lock();

        let mut released = 0;
        for worker in self.workers.iter() {
            for slot in worker.bindings() {
                if slot.is_occupied() && slot.is_bound_to(target) {
                    slot.unpublish();
                    thread::sleep(grace);
                    worker.quiesce();
                    slot.release();
                    released += 1;
                }
            }
        }

        if released > 0 {
            tracing::debug!(producer = producer.id(), slots = released, "Tx threads unbound");
        }
        released
    }

    /// Aggregated statistics of every worker
    pub fn global_stats(&self) -> TxStatsSnapshot {
        self.global.snapshot()
    }

    /// Snapshot of worker `id`
    pub fn worker(&self, id: usize) -> Option<WorkerSnapshot> {
        self.workers.get(id).map(|w| WorkerSnapshot {
            id: w.id(),
            cpu: w.cpu(),
            state: w.state(),
            occupied: w.occupied(),
            sweeps: w.sweeps(),
            sent: w.sent(),
        })
    }

    /// Snapshot of every worker
    pub fn workers(&self) -> Vec<WorkerSnapshot> {
        (0..self.workers.len()).filter_map(|id| self.worker(id)).collect()
    }
}

impl Drop for TxThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}
