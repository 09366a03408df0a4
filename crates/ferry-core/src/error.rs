//! Error types for Ferry.
//!
//! One error enum covers the whole crate; the transfer orchestrators treat
//! every variant as fatal for the session except where the sender's retry
//! engine absorbs per-chunk failures. A rejected transfer is a normal
//! outcome, not an error, and is reported through
//! [`crate::transfer::Outcome`] instead.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Ferry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Ferry.
#[derive(Error, Debug)]
pub enum Error {
    /// Establishing or using the QUIC transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// TLS material could not be generated or applied
    #[error("TLS error: {0}")]
    Tls(String),

    /// A control message was malformed or carried the wrong discriminator
    #[error("invalid protocol message: {0}")]
    Protocol(String),

    /// A chunk arrived with a digest that does not match its payload
    #[error("digest mismatch for chunk {identity}")]
    ChunkDigestMismatch {
        /// Identity of the offending chunk
        identity: u64,
    },

    /// The peer acknowledged a chunk with a non-success byte
    #[error("chunk {identity} was not accepted by the peer")]
    ChunkRejected {
        /// Identity of the offending chunk
        identity: u64,
    },

    /// A substream carried a chunk other than the one expected next
    #[error("received chunk {actual}, expected {expected}")]
    UnexpectedChunk {
        /// Identity the receiver was waiting for
        expected: u64,
        /// Identity found in the frame header
        actual: u64,
    },

    /// The reassembled file does not hash to the digest from the request
    #[error("file integrity verification failed: expected {expected}, got {actual}")]
    IntegrityFailure {
        /// Digest announced in the transfer request
        expected: String,
        /// Digest of the bytes on disk
        actual: String,
    },

    /// An operation exceeded its deadline
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid user-supplied input (peer address, file path)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The chunk planner was given an unusable chunk size
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<quinn::ConnectError> for Error {
    fn from(e: quinn::ConnectError) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<quinn::ConnectionError> for Error {
    fn from(e: quinn::ConnectionError) -> Self {
        Self::Transport(e.to_string())
    }
}
