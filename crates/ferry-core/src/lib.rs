//! # Ferry Core Library
//!
//! `ferry-core` implements a peer-to-peer bulk file transfer protocol for
//! local networks. One sender and one receiver establish a multiplexed QUIC
//! connection over UDP and move a single file as independently acknowledged
//! chunks, with resume support and end-to-end SHA-256 verification.
//!
//! ## Protocol sketch
//!
//! 1. The sender opens a control substream and announces the file (name,
//!    size, whole-file digest, chunk size).
//! 2. The receiver asks the local user for consent, inspects any partial
//!    file from a previous session, and answers with the ordered list of
//!    chunk identities it still needs.
//! 3. Each required chunk travels on its own substream: a 44-byte binary
//!    header, the payload, and a 1-byte acknowledgement back. At most one
//!    chunk is in flight at a time.
//! 4. The receiver re-hashes the reassembled file and compares it against
//!    the announced digest.
//!
//! ## Modules
//!
//! - [`buffer`] - Pooled payload buffers
//! - [`config`] - Configuration management
//! - [`crypto`] - Digests and TLS material
//! - [`discovery`] - Peer discovery via UDP broadcast
//! - [`plan`] - Chunk planning and resume computation
//! - [`protocol`] - Control envelope and chunk frame codecs
//! - [`stream`] - Single-chunk substream I/O
//! - [`transfer`] - Sender and receiver orchestrators
//! - [`transport`] - QUIC endpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_core::transfer::{ReceiveSession, SendSession, TransferConfig};
//!
//! // Receiving peer
//! let session = ReceiveSession::bind(8080, TransferConfig::default())?;
//! let outcome = session.run().await?;
//!
//! // Sending peer
//! let session = SendSession::new("video.mkv".as_ref(), "192.168.1.50", TransferConfig::default()).await?;
//! let outcome = session.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod buffer;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod plan;
pub mod protocol;
pub mod stream;
pub mod transfer;
pub mod transport;

pub use error::{Error, Result};

use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default UDP port for the transfer listener
pub const DEFAULT_TRANSFER_PORT: u16 = 8080;

/// Default chunk size carried in every outbound request (32 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Maximum attempts per chunk, including the first
pub const MAX_RETRIES: u32 = 3;

/// Deadline for each substream open plus chunk exchange
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a whole session, including the receiver's initial accept
pub const SESSION_DEADLINE: Duration = Duration::from_secs(60 * 60);

/// Keep-alive interval hint handed to the transport
pub const CONNECTION_KEEPALIVE: Duration = Duration::from_secs(15);

/// Payloads at or below this size reuse pooled buffers (32 KiB)
pub const CHUNK_BUFFER_THRESHOLD: u64 = 32 * 1024;
