//! Fanout Transmit Pool
//!
//! A fixed set of CPU-pinned Tx threads draining many producers' queues.
//!
//! # Architecture
//!
//! ```text
//!  control path (pool lock)                 hot path (lock-free)
//!  ┌──────────────────────┐
//!  │ bind(w, producer, q) │──publish──┐
//!  │ unbind(producer)     │──unpublish├──► ┌──────────────────────────┐
//!  └──────────────────────┘   + grace │    │ Tx[0] @ cpu 2            │
//!                                     │    │  slots: [P0:q0][P3:q1].. │──► queue_xmit
//!                                     └──► │ Tx[1] @ cpu 3            │
//!                                          │  slots: [P1:q0][ -- ]..  │──► queue_xmit
//!                                          └──────────────────────────┘
//!                                                    │ {ok, fail}
//!                                                    ▼
//!                                   producer TxStats + global TxStats
//! ```
//!
//! # Scheduling
//!
//! Each worker sweeps all of its binding slots, then backs off in two tiers:
//! a yield when nothing was sent, and a coarse sleep when no slot was bound
//! at all. Stop requests are honoured between sweeps only.

#![warn(missing_docs)]

pub mod affinity;
pub mod pool;
pub mod producer;
pub mod worker;

pub use affinity::{check_affinity, CpuTopology, SystemTopology};
pub use pool::{TxThreadPool, WorkerSnapshot};
pub use producer::TxProducer;
pub use worker::RunState;

pub use fanout_common::{TxResponse, TxStats, TxStatsSnapshot};
