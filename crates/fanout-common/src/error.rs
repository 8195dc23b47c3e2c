//! Error types for the fanout engine

use thiserror::Error;

/// Fanout error type
#[derive(Error, Debug)]
pub enum FanoutError {
    /// A Tx thread was configured on a CPU that is not online
    #[error("Tx[{index}] thread bad affinity on cpu {cpu} ({online} cpus online)")]
    BadAffinity {
        /// Position in the configured CPU list
        index: usize,
        /// Offending CPU
        cpu: usize,
        /// Number of online CPUs
        online: usize,
    },

    /// Two Tx threads were configured on the same CPU
    #[error("Tx[{index}] thread cpu {cpu} already in use")]
    CpuInUse {
        /// Position in the configured CPU list
        index: usize,
        /// Offending CPU
        cpu: usize,
    },

    /// Worker id beyond the configured pool size
    #[error("Tx[{0}] thread not available")]
    WorkerNotFound(usize),

    /// Every binding slot of the worker is occupied
    #[error("Tx[{0}] thread busy (no queue available)")]
    WorkerBusy(usize),

    /// The OS refused to create the worker thread
    #[error("failed to spawn Tx thread on cpu {cpu}: {reason}")]
    SpawnFailed {
        /// Target CPU
        cpu: usize,
        /// OS error text
        reason: String,
    },

    /// The worker thread could not be pinned to its CPU
    #[error("failed to pin Tx thread to cpu {cpu}")]
    PinFailed {
        /// Target CPU
        cpu: usize,
    },

    /// Start aborted after some workers were already running.
    ///
    /// The running workers are not rolled back.
    #[error("partial start: {started} of {requested} Tx threads running: {source}")]
    PartialStart {
        /// Workers left running
        started: usize,
        /// Workers requested by the configuration
        requested: usize,
        /// The failure that aborted the start
        #[source]
        source: Box<FanoutError>,
    },

    /// Start requested while workers are still active
    #[error("Tx thread pool already running")]
    AlreadyRunning,

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FanoutError {
    /// True for the no-rollback start outcome
    pub fn is_partial_start(&self) -> bool {
        matches!(self, FanoutError::PartialStart { .. })
    }
}

/// Result type for the fanout engine
pub type FanoutResult<T> = Result<T, FanoutError>;
