//! Fanout Action Engine
//!
//! Pure combinators that decide what happens to a packet once a chain of
//! transform steps has run over it.
//!
//! # Architecture
//!
//! ```text
//!   capture stage                                            dispatcher
//!  ┌────────────┐   Packet { buf, Disposition }            ┌────────────┐
//!  │ zeroed ctx │ ──► step ──► step ──► ... ──► step ──► │  Fanout    │
//!  └────────────┘      │         │                │        │ drop/copy/ │
//!                      ▼         ▼                ▼        │ steer      │
//!               ┌──────────────────────────────────────┐   └────────────┘
//!               │ GroupContext (one per group)         │
//!               │  counters[N]  sparse, lock-free      │
//!               │  slots[M]     spinlock + 64B memory  │
//!               └──────────────────────────────────────┘
//! ```
//!
//! Every combinator takes the packet by value and hands it back wrapped in
//! an [`Action`], so the disposition travels with the packet instead of
//! being reached through a hidden pointer. Across a chain the last write
//! wins.
//!
//! ```
//! use fanout_action::{action, GroupContext, Packet};
//!
//! let group = GroupContext::with_capacity(4, 4, 1);
//! let pkt = Packet::new([0u8; 64], &group);
//!
//! let pkt = action::pass(pkt)
//!     .and_then(|b| action::deliver(b, 0b0110))
//!     .into_inner();
//!
//! assert!(pkt.fanout().is_copy());
//! assert_eq!(pkt.fanout().class_mask, 0b0110);
//! ```

#![warn(missing_docs)]

pub mod action;
pub mod chain;
pub mod disposition;
pub mod persistent;

pub use action::Action;
pub use chain::{ActionChain, Step};
pub use disposition::{Disposition, Fanout, FanoutKind, LogFlags, Packet, CLASS_ANY, CLASS_DEFAULT};
pub use persistent::{GroupContext, PersistentGuard, MAX_SLOT_BYTES};
