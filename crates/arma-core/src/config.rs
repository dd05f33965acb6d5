/// Runtime configuration for an analysis run.
///
/// Every component receives its configuration explicitly through its
/// constructor; nothing is read from process-wide state.
use crate::error::AnalysisError;
use std::fmt;
use std::time::Duration;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Initial `COUNT` hint sent with each `SCAN` request.
pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Maximum number of batches processed concurrently per database.
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Per-request read timeout on every store connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for establishing a store connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How to reach the store.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// ACL user name (Redis 6+). `None` authenticates as the default user.
    pub username: Option<String>,
    pub password: Option<String>,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// `host:port`, as used in log lines and error messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("read_timeout", &self.read_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// What the orchestrator does when a database pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Fail the whole run with the first error and stop the other pipelines
    /// at their next batch boundary.
    #[default]
    Abort,
    /// Report every database that completed and list the failures alongside.
    Continue,
}

/// What to analyse and how hard to push the store.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Separator between key-name segments, e.g. `:` in `user:42:profile`.
    pub delimiter: String,
    /// Number of leading segments kept in a group label.
    pub level: usize,
    /// Restrict the run to a single database. `None` analyses all of them.
    pub only_db: Option<u32>,
    /// Initial `SCAN` batch-size target.
    pub scan_count: usize,
    /// Worker pool size per database.
    pub concurrency: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            delimiter: ":".to_string(),
            level: 1,
            only_db: None,
            scan_count: DEFAULT_SCAN_COUNT,
            concurrency: DEFAULT_CONCURRENCY,
            error_policy: ErrorPolicy::Abort,
        }
    }
}

impl AnalysisConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.delimiter.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "delimiter must not be empty".into(),
            ));
        }
        if self.level == 0 {
            return Err(AnalysisError::InvalidConfig(
                "grouping level must be at least 1".into(),
            ));
        }
        if self.scan_count == 0 {
            return Err(AnalysisError::InvalidConfig(
                "scan count must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
