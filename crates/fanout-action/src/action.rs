//! Action combinators
//!
//! Each combinator reads or writes the disposition of the packet it is
//! given and nothing else. They are total over a packet built with
//! [`Packet::new`] and never block, except [`get_persistent`] which spins
//! until its slot is free.

use crate::disposition::{FanoutKind, Packet, CLASS_ANY};
use crate::persistent::PersistentGuard;
use bytemuck::Pod;
use fanout_common::SparseCounter;

/// Value produced by a combinator step
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action<T> {
    value: T,
}

impl<T> Action<T> {
    /// Wrap a value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    /// Borrow the carried value
    #[inline(always)]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutably borrow the carried value
    #[inline(always)]
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Unwrap the carried value
    #[inline(always)]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Transform the carried value
    #[inline(always)]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Action<U> {
        Action::new(f(self.value))
    }

    /// Feed the carried value to the next step
    #[inline(always)]
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Action<U>) -> Action<U> {
        f(self.value)
    }
}

impl<T> From<T> for Action<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Leave the disposition untouched
#[inline(always)]
pub fn pass<P>(b: Packet<'_, P>) -> Action<Packet<'_, P>> {
    Action::new(b)
}

/// Discard; class mask and hash are left as they are
#[inline(always)]
pub fn drop<P>(mut b: Packet<'_, P>) -> Action<Packet<'_, P>> {
    b.ctx.fanout.kind = FanoutKind::Drop;
    Action::new(b)
}

/// Copy to the current class mask
#[inline(always)]
pub fn copy<P>(mut b: Packet<'_, P>) -> Action<Packet<'_, P>> {
    b.ctx.fanout.kind = FanoutKind::Copy;
    Action::new(b)
}

/// Set the class mask only
#[inline(always)]
pub fn class<P>(mut b: Packet<'_, P>, class_mask: u64) -> Action<Packet<'_, P>> {
    b.ctx.fanout.class_mask = class_mask;
    Action::new(b)
}

/// Copy to every class
#[inline(always)]
pub fn broadcast<P>(mut b: Packet<'_, P>) -> Action<Packet<'_, P>> {
    let f = &mut b.ctx.fanout;
    f.kind = FanoutKind::Copy;
    f.class_mask = CLASS_ANY;
    Action::new(b)
}

/// Steer by hash; the class mask is left to the dispatcher's policy
#[inline(always)]
pub fn steering<P>(mut b: Packet<'_, P>, hash: u32) -> Action<Packet<'_, P>> {
    let f = &mut b.ctx.fanout;
    f.kind = FanoutKind::Steer;
    f.hash = hash;
    Action::new(b)
}

/// Copy to `class_mask`
#[inline(always)]
pub fn deliver<P>(mut b: Packet<'_, P>, class_mask: u64) -> Action<Packet<'_, P>> {
    let f = &mut b.ctx.fanout;
    f.kind = FanoutKind::Copy;
    f.class_mask = class_mask;
    Action::new(b)
}

/// Steer by hash within `class_mask`
#[inline(always)]
pub fn dispatch<P>(mut b: Packet<'_, P>, class_mask: u64, hash: u32) -> Action<Packet<'_, P>> {
    let f = &mut b.ctx.fanout;
    f.kind = FanoutKind::Steer;
    f.class_mask = class_mask;
    f.hash = hash;
    Action::new(b)
}

/// Flag the packet for the host stack, independently of its fanout
#[inline(always)]
pub fn to_kernel<P>(mut b: Packet<'_, P>) -> Packet<'_, P> {
    b.ctx.log.to_kernel = true;
    b
}

/// Read the carry word
#[inline(always)]
pub fn get_state<P>(b: &Packet<'_, P>) -> u64 {
    b.ctx.state
}

/// Write the carry word
#[inline(always)]
pub fn set_state<P>(b: &mut Packet<'_, P>, state: u64) {
    b.ctx.state = state;
}

/// Counter `n` of the packet's group, `None` when out of range.
///
/// Counters only grow: use [`SparseCounter::add`] / [`SparseCounter::inc`].
#[inline(always)]
pub fn get_counter<'g, P>(b: &Packet<'g, P>, n: i32) -> Option<&'g SparseCounter> {
    b.group().counter(n)
}

/// Lock persistent slot `n` of the packet's group and view it as `T`.
///
/// Spins while another CPU holds the slot. `None` when `n` is out of
/// range. A `T` larger than [`crate::MAX_SLOT_BYTES`] does not compile.
#[inline(always)]
pub fn get_persistent<'g, T: Pod, P>(b: &Packet<'g, P>, n: i32) -> Option<PersistentGuard<'g, T>> {
    b.group().persistent(n)
}

/// Release a slot taken with [`get_persistent`]
#[inline(always)]
pub fn put_persistent<T: Pod>(guard: PersistentGuard<'_, T>) {
    std::mem::drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposition::{Fanout, CLASS_DEFAULT};
    use crate::persistent::GroupContext;
    use proptest::prelude::*;

    fn group() -> GroupContext {
        GroupContext::with_capacity(8, 4, 2)
    }

    #[test]
    fn test_pass_keeps_disposition() {
        let g = group();
        let pkt = deliver(Packet::new((), &g), 0b11).into_inner();
        let before = pkt.fanout();
        let pkt = pass(pkt).into_inner();
        assert_eq!(pkt.fanout(), before);
    }

    #[test]
    fn test_drop_keeps_mask_and_hash() {
        let g = group();
        let pkt = dispatch(Packet::new((), &g), 0b101, 99)
            .and_then(drop)
            .into_inner();

        assert!(pkt.fanout().is_drop());
        assert_eq!(pkt.fanout().class_mask, 0b101);
        assert_eq!(pkt.fanout().hash, 99);
    }

    #[test]
    fn test_copy_then_class() {
        let g = group();
        let pkt = copy(Packet::new((), &g)).into_inner();
        assert!(pkt.fanout().is_copy());
        assert_eq!(pkt.fanout().class_mask, 0);

        let pkt = class(pkt, CLASS_DEFAULT).into_inner();
        assert!(pkt.fanout().is_copy());
        assert_eq!(pkt.fanout().class_mask, CLASS_DEFAULT);
    }

    #[test]
    fn test_class_does_not_change_kind() {
        let g = group();
        let pkt = steering(Packet::new((), &g), 5)
            .and_then(|b| class(b, 0b1000))
            .into_inner();
        assert_eq!(
            pkt.fanout(),
            Fanout {
                kind: FanoutKind::Steer,
                class_mask: 0b1000,
                hash: 5
            }
        );
    }

    #[test]
    fn test_steering_keeps_mask() {
        let g = group();
        let pkt = deliver(Packet::new((), &g), 0b110)
            .and_then(|b| steering(b, 0xdead_beef))
            .into_inner();

        assert!(pkt.fanout().is_steer());
        assert_eq!(pkt.fanout().class_mask, 0b110);
        assert_eq!(pkt.fanout().hash, 0xdead_beef);
    }

    #[test]
    fn test_to_kernel_is_orthogonal() {
        let g = group();
        let pkt = drop(to_kernel(Packet::new((), &g))).into_inner();
        assert!(pkt.fanout().is_drop());
        assert!(pkt.ctx.log.to_kernel);

        let pkt = broadcast(pkt).into_inner();
        assert!(pkt.ctx.log.to_kernel);
    }

    #[test]
    fn test_state_is_per_packet() {
        let g = group();
        let mut a = Packet::new(1u32, &g);
        let b = Packet::new(2u32, &g);

        set_state(&mut a, 0xabcd);
        assert_eq!(get_state(&a), 0xabcd);
        assert_eq!(get_state(&b), 0);
    }

    #[test]
    fn test_counter_through_packet() {
        let g = group();
        let pkt = Packet::new((), &g);

        get_counter(&pkt, 3).unwrap().inc();
        get_counter(&pkt, 3).unwrap().add(2);
        assert_eq!(g.counter(3).unwrap().read(), 3);
        assert!(get_counter(&pkt, 8).is_none());
        assert!(get_counter(&pkt, -1).is_none());
    }

    #[test]
    fn test_persistent_through_packet() {
        let g = group();
        let pkt = Packet::new((), &g);

        let mut seen = get_persistent::<u64, _>(&pkt, 1).unwrap();
        *seen += 10;
        put_persistent(seen);

        let seen = get_persistent::<u64, _>(&pkt, 1).unwrap();
        assert_eq!(*seen, 10);
        put_persistent(seen);

        assert!(get_persistent::<u64, _>(&pkt, 4).is_none());
    }

    #[test]
    fn test_action_map() {
        let a = Action::new(2).map(|v| v * 21);
        assert_eq!(a.into_inner(), 42);
        let mut b: Action<u8> = 7.into();
        *b.value_mut() += 1;
        assert_eq!(*b.value(), 8);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Pass,
        Drop,
        Copy,
        Class(u64),
        Broadcast,
        Steering(u32),
        Deliver(u64),
        Dispatch(u64, u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Pass),
            Just(Op::Drop),
            Just(Op::Copy),
            any::<u64>().prop_map(Op::Class),
            Just(Op::Broadcast),
            any::<u32>().prop_map(Op::Steering),
            any::<u64>().prop_map(Op::Deliver),
            (any::<u64>(), any::<u32>()).prop_map(|(m, h)| Op::Dispatch(m, h)),
        ]
    }

    fn apply<'g>(b: Packet<'g, ()>, op: &Op) -> Packet<'g, ()> {
        let next = match *op {
            Op::Pass => pass(b),
            Op::Drop => drop(b),
            Op::Copy => copy(b),
            Op::Class(m) => class(b, m),
            Op::Broadcast => broadcast(b),
            Op::Steering(h) => steering(b, h),
            Op::Deliver(m) => deliver(b, m),
            Op::Dispatch(m, h) => dispatch(b, m, h),
        };
        next.into_inner()
    }

    /// Expected descriptor, replaying the field writes of each op
    fn model(ops: &[Op]) -> Fanout {
        let mut f = Fanout::default();
        for op in ops {
            match *op {
                Op::Pass => {}
                Op::Drop => f.kind = FanoutKind::Drop,
                Op::Copy => f.kind = FanoutKind::Copy,
                Op::Class(m) => f.class_mask = m,
                Op::Broadcast => {
                    f.kind = FanoutKind::Copy;
                    f.class_mask = CLASS_ANY;
                }
                Op::Steering(h) => {
                    f.kind = FanoutKind::Steer;
                    f.hash = h;
                }
                Op::Deliver(m) => {
                    f.kind = FanoutKind::Copy;
                    f.class_mask = m;
                }
                Op::Dispatch(m, h) => {
                    f.kind = FanoutKind::Steer;
                    f.class_mask = m;
                    f.hash = h;
                }
            }
        }
        f
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(ops in proptest::collection::vec(op(), 0..24)) {
            let g = GroupContext::with_capacity(1, 1, 1);
            let pkt = ops.iter().fold(Packet::new((), &g), apply);
            prop_assert_eq!(pkt.fanout(), model(&ops));
        }

        #[test]
        fn prop_broadcast_from_any_state(ops in proptest::collection::vec(op(), 0..12)) {
            let g = GroupContext::with_capacity(1, 1, 1);
            let pkt = ops.iter().fold(Packet::new((), &g), apply);
            let pkt = broadcast(pkt).into_inner();
            prop_assert_eq!(pkt.fanout().kind, FanoutKind::Copy);
            prop_assert_eq!(pkt.fanout().class_mask, CLASS_ANY);
        }

        #[test]
        fn prop_counter_bounds(n in any::<i32>()) {
            let g = GroupContext::with_capacity(16, 1, 1);
            let pkt = Packet::new((), &g);
            prop_assert_eq!(get_counter(&pkt, n).is_some(), (0..16).contains(&n));
        }
    }
}
