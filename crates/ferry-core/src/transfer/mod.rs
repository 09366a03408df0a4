//! File transfer engine for Ferry.
//!
//! One session moves one file between two peers:
//!
//! - [`SendSession`] dials the receiver, announces the file, and streams the
//!   chunks the receiver asked for, one substream per chunk.
//! - [`ReceiveSession`] accepts the connection, asks the local user for
//!   consent, answers with the resume list, writes chunks at their byte
//!   offsets and verifies the reassembled file.
//!
//! Both sides are strictly sequential: a single control substream, then one
//! data substream at a time in resume-list order. The transport may shuffle
//! packets underneath; the protocol never has two chunks in flight.

mod recv;
mod send;

pub use recv::{Confirmation, ReceiveSession, OUTPUT_PREFIX};
pub use send::SendSession;

use std::time::Duration;

use tokio::sync::watch;

use crate::config::Config;

/// Pause inserted every tenth chunk so OS I/O can drain.
const SHORT_PACE: Duration = Duration::from_millis(2);

/// Longer pause inserted every fiftieth chunk.
const LONG_PACE: Duration = Duration::from_millis(50);

/// Settle time the receiver allows after writing its response.
const RESPONSE_SETTLE: Duration = Duration::from_millis(50);

/// Settle time the sender allows after the last acknowledgement.
const FINAL_SETTLE: Duration = Duration::from_millis(100);

/// Configuration for a transfer session.
///
/// Copied out of the process [`Config`] so individual sessions (and tests)
/// can deviate without touching global state.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk size in bytes
    pub chunk_size: u64,
    /// Attempts per chunk, including the first
    pub max_retries: u32,
    /// Deadline for each substream open plus chunk exchange
    pub stream_timeout: Duration,
    /// Deadline for the whole session
    pub session_deadline: Duration,
    /// Keep-alive interval hint for the transport
    pub keepalive: Duration,
    /// Payloads at or below this size reuse pooled buffers
    pub buffer_threshold: u64,
    /// Accept incoming transfers without prompting
    pub test_mode: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_retries: crate::MAX_RETRIES,
            stream_timeout: crate::STREAM_TIMEOUT,
            session_deadline: crate::SESSION_DEADLINE,
            keepalive: crate::CONNECTION_KEEPALIVE,
            buffer_threshold: crate::CHUNK_BUFFER_THRESHOLD,
            test_mode: false,
        }
    }
}

impl From<&Config> for TransferConfig {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size: config.transfer.chunk_size,
            max_retries: config.transfer.max_retries,
            stream_timeout: config.transfer.stream_timeout,
            session_deadline: config.transfer.session_deadline,
            keepalive: config.network.keepalive,
            buffer_threshold: config.transfer.buffer_threshold,
            test_mode: config.test_mode,
        }
    }
}

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Session created, nothing on the wire yet
    Preparing,
    /// Establishing the transport connection
    Connecting,
    /// Exchanging the control request and response
    Handshaking,
    /// Moving chunk substreams
    Transferring,
    /// Re-hashing the output file
    Verifying,
    /// Transfer finished and verified
    Completed,
    /// The receiver declined the transfer
    Rejected,
    /// The session failed
    Failed,
}

/// Progress snapshot published through a watch channel.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Current state
    pub state: TransferState,
    /// Chunks acknowledged so far
    pub chunks_done: u64,
    /// Chunks this session will move (resume list length)
    pub chunks_total: u64,
    /// Payload bytes moved so far
    pub bytes_done: u64,
    /// Payload bytes this session will move
    pub bytes_total: u64,
}

impl TransferProgress {
    fn new() -> Self {
        Self {
            state: TransferState::Preparing,
            chunks_done: 0,
            chunks_total: 0,
            bytes_done: 0,
            bytes_total: 0,
        }
    }

    /// Overall progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.bytes_total == 0 {
            100.0
        } else {
            (self.bytes_done as f64 / self.bytes_total as f64) * 100.0
        }
    }
}

/// How a session ended, short of an error.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The file was moved and verified
    Completed(TransferReport),
    /// The receiver declined; this is a normal outcome, not an error
    Rejected {
        /// Reason string from the response
        reason: String,
    },
}

/// Summary of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Base name of the transferred file
    pub filename: String,
    /// Total file size in bytes
    pub filesize: u64,
    /// Chunks the session was asked to move
    pub chunks_planned: u64,
    /// Payload bytes actually moved this session
    pub bytes_moved: u64,
    /// Retry attempts beyond each chunk's first try
    pub retries: u32,
    /// Wall-clock session duration
    pub duration: Duration,
}

impl TransferReport {
    /// Average throughput over the session, in MiB per second.
    #[must_use]
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_moved as f64 / secs / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }
}

/// Format a byte count for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Shared progress plumbing for both session types.
#[derive(Debug)]
struct ProgressFeed {
    tx: watch::Sender<TransferProgress>,
    rx: watch::Receiver<TransferProgress>,
}

impl ProgressFeed {
    fn new() -> Self {
        let (tx, rx) = watch::channel(TransferProgress::new());
        Self { tx, rx }
    }

    fn subscribe(&self) -> watch::Receiver<TransferProgress> {
        self.rx.clone()
    }

    fn set_state(&self, state: TransferState) {
        let mut progress = self.rx.borrow().clone();
        progress.state = state;
        let _ = self.tx.send(progress);
    }

    fn set_totals(&self, chunks_total: u64, bytes_total: u64) {
        let mut progress = self.rx.borrow().clone();
        progress.chunks_total = chunks_total;
        progress.bytes_total = bytes_total;
        let _ = self.tx.send(progress);
    }

    fn add_chunk(&self, bytes: u64) {
        let mut progress = self.rx.borrow().clone();
        progress.chunks_done += 1;
        progress.bytes_done += bytes;
        let _ = self.tx.send(progress);
    }
}

/// Cooperative pause at periodic chunk boundaries.
///
/// Observable only as latency; framing and ordering are unaffected.
async fn pace(position: usize) {
    let done = position + 1;
    if done % 50 == 0 {
        tokio::time::sleep(LONG_PACE).await;
    } else if done % 10 == 0 {
        tokio::time::sleep(SHORT_PACE).await;
    }
}
