/// Error types for the analysis engine.
///
/// Two layers:
/// - [`StoreError`] is what a store adapter returns for a single request.
/// - [`AnalysisError`] is what a pipeline or the orchestrator returns. It
///   names the database and the operation that failed so the message is
///   actionable on its own.
///
/// None of these are retried. A failing request ends the pipeline that
/// issued it; the orchestrator's [`ErrorPolicy`](crate::ErrorPolicy) decides
/// what that means for the rest of the run.
use std::fmt;
use thiserror::Error;

/// A single store request failed.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport or protocol error from the Redis client.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// The server answered, but not with anything we can use.
    #[error("unexpected reply to {command}: {detail}")]
    UnexpectedReply {
        command: &'static str,
        detail: String,
    },

    /// Failure reported by a non-Redis backend (e.g. the in-memory store).
    #[error("{0}")]
    Backend(String),
}

/// Which step of opening a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Ping,
    KeyspaceSummary,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Ping => "ping",
            Self::KeyspaceSummary => "read keyspace summary",
        })
    }
}

/// A run or a database pipeline failed.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Could not establish, validate, or query a connection.
    #[error("db {db}: {stage} failed: {source}")]
    Connection {
        db: u32,
        stage: Stage,
        #[source]
        source: StoreError,
    },

    /// A `SCAN` request failed mid-iteration.
    #[error("db {db}: scan at cursor {cursor} failed: {source}")]
    Scan {
        db: u32,
        cursor: u64,
        #[source]
        source: StoreError,
    },

    /// A `MEMORY USAGE` request failed.
    #[error("db {db}: memory usage query for key '{key}' failed: {source}")]
    SizeQuery {
        db: u32,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The pipeline was stopped because another database failed first.
    #[error("db {db}: analysis stopped after a failure in another database")]
    Aborted { db: u32 },

    /// A pipeline or worker thread could not be started.
    #[error("db {db}: failed to spawn thread: {source}")]
    Spawn {
        db: u32,
        #[source]
        source: std::io::Error,
    },

    /// A pipeline or worker thread panicked.
    #[error("db {db}: worker thread panicked")]
    WorkerPanicked { db: u32 },

    /// The orchestrator thread itself panicked.
    #[error("analysis thread panicked")]
    Panicked,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// Database the error belongs to, if it is scoped to one.
    pub fn db(&self) -> Option<u32> {
        match self {
            Self::Connection { db, .. }
            | Self::Scan { db, .. }
            | Self::SizeQuery { db, .. }
            | Self::Aborted { db }
            | Self::Spawn { db, .. }
            | Self::WorkerPanicked { db } => Some(*db),
            Self::Panicked | Self::InvalidConfig(_) => None,
        }
    }

    /// `true` for the secondary errors raised when the run is being torn down
    /// because of a failure elsewhere.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
