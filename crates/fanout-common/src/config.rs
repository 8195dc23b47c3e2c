//! Fanout Configuration
//!
//! Capacities are read once when a group context or a Tx pool is created
//! and never change afterwards.

use crate::counter::default_shards;
use crate::error::{FanoutError, FanoutResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Per-group persistent context capacities
    pub group: GroupConfig,
    /// Transmit worker pool
    pub tx: TxPoolConfig,
}

impl FanoutConfig {
    /// Load from a JSON file and validate
    pub fn load(path: impl AsRef<Path>) -> FanoutResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse from a JSON document and validate
    pub fn from_json(content: &str) -> FanoutResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> FanoutResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> FanoutResult<()> {
        self.group.validate()?;
        self.tx.validate()
    }
}

/// Persistent group context capacities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Number of sparse counters per group
    pub counters: usize,
    /// Number of lock-guarded persistent slots per group
    pub persistent_slots: usize,
    /// Shards per counter (defaults to the CPU count)
    pub counter_shards: Option<usize>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            counters: 64,
            persistent_slots: 64,
            counter_shards: None,
        }
    }
}

impl GroupConfig {
    /// Effective shard count
    pub fn shards(&self) -> usize {
        self.counter_shards.unwrap_or_else(default_shards).max(1)
    }

    /// Reject empty capacities
    pub fn validate(&self) -> FanoutResult<()> {
        if self.counters == 0 {
            return Err(FanoutError::Config("group.counters must be > 0".into()));
        }
        if self.persistent_slots == 0 {
            return Err(FanoutError::Config("group.persistent_slots must be > 0".into()));
        }
        if self.counter_shards == Some(0) {
            return Err(FanoutError::Config("group.counter_shards must be > 0".into()));
        }
        Ok(())
    }
}

/// Transmit worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TxPoolConfig {
    /// CPUs dedicated to Tx threads, one worker per entry, in id order
    pub tx_cpus: Vec<usize>,
    /// Binding slots per worker
    pub queues_per_worker: usize,
    /// Delay between unpublishing a binding and releasing its producer
    pub grace_period_ms: u64,
    /// Sleep when a sweep found no bound queue
    pub idle_sleep_us: u64,
    /// Interval of the worker heartbeat trace
    pub heartbeat_secs: u64,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            tx_cpus: Vec::new(),
            queues_per_worker: 4,
            grace_period_ms: 100,
            idle_sleep_us: 1000,
            heartbeat_secs: 10,
        }
    }
}

impl TxPoolConfig {
    /// Config for the given CPUs, everything else defaulted
    pub fn with_cpus(tx_cpus: impl Into<Vec<usize>>) -> Self {
        Self {
            tx_cpus: tx_cpus.into(),
            ..Default::default()
        }
    }

    /// Pool size
    pub fn workers(&self) -> usize {
        self.tx_cpus.len()
    }

    /// Unbind grace period
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Idle backoff
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }

    /// Heartbeat interval
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Reject capacities the pool cannot work with
    pub fn validate(&self) -> FanoutResult<()> {
        if self.queues_per_worker == 0 {
            return Err(FanoutError::Config("tx.queues_per_worker must be > 0".into()));
        }
        if self.grace_period_ms == 0 {
            return Err(FanoutError::Config("tx.grace_period_ms must be > 0".into()));
        }
        Ok(())
    }
}
