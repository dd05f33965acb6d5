/// Scan progress reporting: lightweight messages sent from the pipeline
/// threads to the frontend via a crossbeam channel.
use crate::store::Database;
use crossbeam_channel::Sender;
use std::time::Duration;

/// Maximum number of progress messages that may queue up in the channel.
///
/// The CLI drains the channel continuously. If nobody is listening the
/// receiver is dropped and sends fail immediately instead of blocking.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Progress updates sent to the frontend.
///
/// The results themselves travel in the final
/// [`AnalysisOutcome`](crate::AnalysisOutcome); these messages carry only
/// counters and status.
#[derive(Debug, Clone)]
pub enum ScanProgress {
    /// The keyspace summary was read and these databases will be analysed.
    Databases { selected: Vec<Database> },
    /// A database pipeline started.
    Started { db: u32, approx_keys: u64 },
    /// A batch of keys was sized and aggregated.
    KeysProcessed { db: u32, keys: u64 },
    /// A database pipeline finished and its report is final.
    Complete {
        db: u32,
        keys: u64,
        size: u64,
        duration: Duration,
    },
    /// A database pipeline failed; no report will be produced for it.
    Failed { db: u32, message: String },
}

/// Optional sending side of the progress channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<ScanProgress>>,
}

impl ProgressSink {
    pub fn new(tx: Sender<ScanProgress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Send a message. A closed or absent channel is ignored.
    pub fn send(&self, message: ScanProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message);
        }
    }
}
