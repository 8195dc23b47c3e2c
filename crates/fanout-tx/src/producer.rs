//! Producer boundary

use fanout_common::{TxResponse, TxStats};

/// Owner of pending transmit queues (a capture socket, typically)
///
/// The pool only ever calls [`TxProducer::queue_xmit`]; it never looks
/// inside the producer.
pub trait TxProducer: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> u64;

    /// Transmit what is pending on `queue`, on behalf of the worker pinned
    /// to `cpu`.
    fn queue_xmit(&self, queue: usize, cpu: usize) -> TxResponse;

    /// Producer statistics, updated by the pool after every call
    fn stats(&self) -> &TxStats;
}
