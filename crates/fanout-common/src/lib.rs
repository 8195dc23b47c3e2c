//! Fanout Common - shared primitives for the packet fanout engine
//!
//! This crate provides the pieces shared by the action engine and the
//! transmit worker pool:
//! - Sparse (per-CPU sharded) counters and counter banks
//! - Transmit statistics (`sent` / `fail` pairs)
//! - Error handling
//! - Configuration
//!
//! The two subsystems never talk to each other directly; the sparse
//! counters are their only meeting point.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod counter;
pub mod error;

pub use config::{FanoutConfig, GroupConfig, TxPoolConfig};
pub use counter::{CounterBank, SparseCounter, TxResponse, TxStats, TxStatsSnapshot};
pub use error::{FanoutError, FanoutResult};
