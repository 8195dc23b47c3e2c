//! Action chains
//!
//! step → step → ... → step → Fanout
//!
//! A chain runs every step over the packet in order and hands the final
//! descriptor to the dispatcher. There is no short-circuit: a later step
//! may overturn an earlier `drop`.

use crate::action::{self, Action};
use crate::disposition::{Fanout, Packet};

/// One step of a chain
pub trait Step<P>: Send + Sync {
    /// Apply the step to a packet
    fn apply<'g>(&self, b: Packet<'g, P>) -> Action<Packet<'g, P>>;

    /// Step name for tracing
    fn name(&self) -> &'static str;
}

/// Step built from a combinator function or closure
pub struct FnStep<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStep<F> {
    /// Name a function as a step
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<P, F> Step<P> for FnStep<F>
where
    F: for<'g> Fn(Packet<'g, P>) -> Action<Packet<'g, P>> + Send + Sync,
{
    #[inline]
    fn apply<'g>(&self, b: Packet<'g, P>) -> Action<Packet<'g, P>> {
        (self.f)(b)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Ordered list of steps
pub struct ActionChain<P> {
    steps: Vec<Box<dyn Step<P>>>,
}

impl<P> ActionChain<P> {
    /// Empty chain (behaves like `pass`)
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a named combinator
    pub fn push<F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        F: for<'g> Fn(Packet<'g, P>) -> Action<Packet<'g, P>> + Send + Sync + 'static,
    {
        self.steps.push(Box::new(FnStep::new(name, f)));
        self
    }

    /// Append a step
    pub fn push_step(&mut self, step: Box<dyn Step<P>>) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Run every step and return the packet
    #[inline]
    pub fn run<'g>(&self, b: Packet<'g, P>) -> Packet<'g, P> {
        self.steps
            .iter()
            .fold(action::pass(b), |acc, step| acc.and_then(|b| step.apply(b)))
            .into_inner()
    }

    /// Run every step and return only the final descriptor
    #[inline]
    pub fn fanout(&self, b: Packet<'_, P>) -> Fanout {
        self.run(b).fanout()
    }

    /// Step names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the chain has no step
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<P> Default for ActionChain<P> {
    fn default() -> Self {
        Self::new()
    }
}
