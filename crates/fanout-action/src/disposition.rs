//! Packet disposition
//!
//! The fanout descriptor, the per-packet disposition context and the
//! packet handle that carries both through a combinator chain.

use crate::persistent::GroupContext;

/// Class bit used when no explicit class is requested
pub const CLASS_DEFAULT: u64 = 1;

/// Every delivery class
pub const CLASS_ANY: u64 = u64::MAX;

/// Fanout decision
///
/// The discriminants match the zero-initialized descriptor handed over by
/// the capture stage: a fresh packet is `Drop` until a step says otherwise.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FanoutKind {
    /// Discard
    #[default]
    Drop = 0,
    /// Deliver to every class in the mask
    Copy = 1,
    /// Deliver to one class in the mask, selected by hash
    Steer = 2,
}

/// Fanout descriptor read by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fanout {
    /// What to do with the packet
    pub kind: FanoutKind,
    /// Eligible delivery classes (ignored for `Drop`)
    pub class_mask: u64,
    /// Steering hash (only meaningful for `Steer`)
    pub hash: u32,
}

impl Fanout {
    /// Packet is discarded
    #[inline(always)]
    pub fn is_drop(&self) -> bool {
        self.kind == FanoutKind::Drop
    }

    /// Packet is copied to every class in the mask
    #[inline(always)]
    pub fn is_copy(&self) -> bool {
        self.kind == FanoutKind::Copy
    }

    /// Packet is steered to one class in the mask
    #[inline(always)]
    pub fn is_steer(&self) -> bool {
        self.kind == FanoutKind::Steer
    }

    /// Number of eligible classes
    pub fn class_count(&self) -> u32 {
        if self.is_drop() {
            return 0;
        }
        self.class_mask.count_ones()
    }

    /// Indices of the eligible classes, lowest first
    pub fn classes(&self) -> impl Iterator<Item = u32> {
        let mut mask = if self.is_drop() { 0 } else { self.class_mask };
        std::iter::from_fn(move || {
            if mask == 0 {
                return None;
            }
            let bit = mask.trailing_zeros();
            mask &= mask - 1;
            Some(bit)
        })
    }
}

/// Side-channel flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogFlags {
    /// Also hand the packet to the host stack
    pub to_kernel: bool,
}

/// Per-packet disposition context
///
/// Created zeroed by the capture stage, mutated only by the combinators
/// applied to its packet.
#[derive(Debug, Clone, Copy)]
pub struct Disposition<'g> {
    /// Fanout decision so far
    pub fanout: Fanout,
    /// Carry word threaded between steps
    pub state: u64,
    /// Log flags
    pub log: LogFlags,
    group: &'g GroupContext,
}

impl<'g> Disposition<'g> {
    /// Zeroed context bound to a live group
    pub fn new(group: &'g GroupContext) -> Self {
        Self {
            fanout: Fanout::default(),
            state: 0,
            log: LogFlags::default(),
            group,
        }
    }

    /// Group context shared by every packet of the group
    #[inline(always)]
    pub fn group(&self) -> &'g GroupContext {
        self.group
    }
}

/// In-flight packet together with its disposition
#[derive(Debug)]
pub struct Packet<'g, P> {
    /// Packet payload or handle, opaque to the engine
    pub buf: P,
    /// Disposition carried alongside the payload
    pub ctx: Disposition<'g>,
}

impl<'g, P> Packet<'g, P> {
    /// Wrap a freshly captured packet
    pub fn new(buf: P, group: &'g GroupContext) -> Self {
        Self {
            buf,
            ctx: Disposition::new(group),
        }
    }

    /// Current fanout descriptor
    #[inline(always)]
    pub fn fanout(&self) -> Fanout {
        self.ctx.fanout
    }

    /// Group context
    #[inline(always)]
    pub fn group(&self) -> &'g GroupContext {
        self.ctx.group
    }

    /// Split into payload and disposition
    pub fn into_parts(self) -> (P, Disposition<'g>) {
        (self.buf, self.ctx)
    }
}
