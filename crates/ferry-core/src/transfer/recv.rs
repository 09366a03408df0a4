//! Receiver side of the chunked transfer protocol.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;

use crate::crypto;
use crate::error::{Error, Result};
use crate::plan;
use crate::protocol::{self, TransferRequest, TransferResponse};
use crate::stream;
use crate::transport;

use super::{
    format_size, pace, Outcome, ProgressFeed, TransferConfig, TransferProgress, TransferReport,
    TransferState, RESPONSE_SETTLE,
};

/// Prefix prepended to every received file name.
pub const OUTPUT_PREFIX: &str = "received_";

/// How an incoming request gets its accept-or-reject decision.
#[derive(Debug, Clone)]
pub enum Confirmation {
    /// Accept without asking (test mode)
    AutoAccept,
    /// Reject without asking, with the given reason (policy hooks, tests)
    AutoReject(String),
    /// Ask the local user on stdin; invalid input counts as a rejection
    Prompt,
}

impl Confirmation {
    async fn decide(&self, request: &TransferRequest) -> (bool, String) {
        match self {
            Self::AutoAccept => {
                tracing::info!("test mode: automatically accepting transfer");
                (true, String::new())
            }
            Self::AutoReject(reason) => (false, reason.clone()),
            Self::Prompt => prompt_for_confirmation(request).await,
        }
    }
}

/// Ask the user to accept or reject a transfer.
///
/// Runs the blocking stdin read on the blocking pool so the runtime (and
/// the transport's keep-alives) stay live while the user thinks.
async fn prompt_for_confirmation(request: &TransferRequest) -> (bool, String) {
    let filename = request.filename.clone();
    let size = format_size(request.filesize);
    let digest = request.whole_file_digest.clone();

    let decision = tokio::task::spawn_blocking(move || {
        println!();
        println!("--- Incoming Transfer Request ---");
        println!("File: {filename}");
        println!("Size: {size}");
        println!("Hash: {digest}");
        println!("---------------------------------");
        print!("Accept this transfer? (yes/no): ");
        let _ = std::io::stdout().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() {
            return (false, "error reading user response".to_string());
        }

        match input.trim().to_lowercase().as_str() {
            "yes" | "y" => (true, String::new()),
            "no" | "n" => (false, "user rejected the transfer".to_string()),
            _ => (false, "user provided invalid response".to_string()),
        }
    })
    .await;

    decision.unwrap_or_else(|_| (false, "confirmation prompt failed".to_string()))
}

/// A receiving session: accepts one connection and one file.
pub struct ReceiveSession {
    endpoint: quinn::Endpoint,
    config: TransferConfig,
    confirmation: Confirmation,
    output_dir: PathBuf,
    progress: ProgressFeed,
}

impl std::fmt::Debug for ReceiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveSession")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ReceiveSession {
    /// Bind the transfer port and get ready to accept one session.
    ///
    /// Pass port 0 to let the OS choose (used by tests). The output file
    /// lands in the current working directory unless
    /// [`with_output_dir`](Self::with_output_dir) overrides it.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be bound.
    pub fn bind(port: u16, config: TransferConfig) -> Result<Self> {
        let endpoint = transport::server_endpoint(port, config.keepalive)?;

        let confirmation = if config.test_mode {
            Confirmation::AutoAccept
        } else {
            Confirmation::Prompt
        };

        Ok(Self {
            endpoint,
            config,
            confirmation,
            output_dir: PathBuf::from("."),
            progress: ProgressFeed::new(),
        })
    }

    /// Replace the confirmation collaborator.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Write the output file under `dir` instead of the working directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// The bound transfer address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read back.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Subscribe to progress snapshots.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Accept one connection and run the session to completion.
    ///
    /// # Errors
    ///
    /// Returns an error on any protocol, transport, integrity, or I/O
    /// failure. A partial output file is left on disk so the next session
    /// can resume from it. A rejection decided here is reported as
    /// [`Outcome::Rejected`], not an error.
    pub async fn run(mut self) -> Result<Outcome> {
        let deadline = self.config.session_deadline;
        let result = tokio::time::timeout(deadline, self.run_inner())
            .await
            .unwrap_or(Err(Error::Timeout(deadline.as_secs())));

        if result.is_err() {
            self.progress.set_state(TransferState::Failed);
        }
        result
    }

    async fn run_inner(&mut self) -> Result<Outcome> {
        let started = Instant::now();

        self.progress.set_state(TransferState::Connecting);
        tracing::info!(addr = %self.endpoint.local_addr()?, "listening for chunked transfers");

        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| Error::Transport("endpoint closed while accepting".to_string()))?;
        let connection = incoming.await?;
        tracing::info!(peer = %connection.remote_address(), "connection accepted");

        self.progress.set_state(TransferState::Handshaking);
        let (mut ctrl_tx, mut ctrl_rx) = connection.accept_bi().await?;
        let request = protocol::read_request(&mut ctrl_rx).await?;

        tracing::info!(
            file = %request.filename,
            size = request.filesize,
            "received transfer request"
        );

        let output_path = self.output_path(&request.filename)?;
        let (accepted, reason) = self.confirmation.decide(&request).await;

        // The resume list is computed from on-disk state either way; it is
        // only sent when the transfer is accepted.
        let resume_chunks =
            plan::required_chunks(&output_path, request.filesize, request.chunk_size)?;

        let response = if accepted {
            TransferResponse::accepted(resume_chunks)
        } else {
            TransferResponse::rejected(reason.clone())
        };

        ctrl_tx
            .write_all(&protocol::encode_message(&response)?)
            .await
            .map_err(|e| Error::Transport(format!("failed to send transfer response: {e}")))?;

        // Let the response reach the peer before anything else happens on
        // the connection.
        tokio::time::sleep(RESPONSE_SETTLE).await;

        if !accepted {
            tracing::info!(reason = %reason, "transfer rejected");
            self.progress.set_state(TransferState::Rejected);
            connection.close(transport::CLOSE_DONE.into(), b"rejected");
            return Ok(Outcome::Rejected { reason });
        }

        let ranges: Vec<(u64, std::ops::Range<u64>)> = response
            .resume_chunks
            .iter()
            .map(|&identity| {
                (
                    identity,
                    plan::chunk_range(identity, request.filesize, request.chunk_size),
                )
            })
            .collect();
        let bytes_total: u64 = ranges.iter().map(|(_, r)| r.end - r.start).sum();
        self.progress
            .set_totals(ranges.len() as u64, bytes_total);

        tracing::info!(
            chunks = ranges.len(),
            output = %output_path.display(),
            "accepting transfer"
        );

        self.progress.set_state(TransferState::Transferring);

        // No truncation: bytes persisted by earlier sessions stay in place.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&output_path)
            .await?;

        for (position, (identity, range)) in ranges.iter().enumerate() {
            if range.is_empty() {
                self.progress.add_chunk(0);
                continue;
            }

            // A digest mismatch fails only the substream: the failure ack
            // tells the sender to retransmit, and the replacement arrives on
            // a fresh substream for the same chunk. Everything else is fatal
            // for the session.
            let mut attempt = 0;
            let payload = loop {
                attempt += 1;
                match self
                    .receive_one_chunk(&connection, *identity, range.end - range.start)
                    .await
                {
                    Ok(payload) => break payload,
                    Err(Error::ChunkDigestMismatch { identity })
                        if attempt < self.config.max_retries =>
                    {
                        tracing::warn!(chunk = identity, "chunk failed verification, awaiting retransmit");
                    }
                    Err(e) => return Err(e),
                }
            };

            file.seek(std::io::SeekFrom::Start(range.start)).await?;
            file.write_all(&payload).await?;

            self.progress.add_chunk(payload.len() as u64);
            pace(position).await;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        self.progress.set_state(TransferState::Verifying);
        tracing::info!("verifying file integrity");

        let actual = crypto::digest_hex(&crypto::digest_file(&output_path).await?);
        if !actual.eq_ignore_ascii_case(&request.whole_file_digest) {
            return Err(Error::IntegrityFailure {
                expected: request.whole_file_digest,
                actual,
            });
        }

        connection.close(transport::CLOSE_DONE.into(), b"done");
        self.progress.set_state(TransferState::Completed);
        tracing::info!(output = %output_path.display(), "transfer completed and verified");

        Ok(Outcome::Completed(TransferReport {
            filename: request.filename,
            filesize: request.filesize,
            chunks_planned: ranges.len() as u64,
            bytes_moved: bytes_total,
            retries: 0,
            duration: started.elapsed(),
        }))
    }

    /// Accept the next substream and take one verified chunk from it.
    async fn receive_one_chunk(
        &self,
        connection: &quinn::Connection,
        identity: u64,
        expected_len: u64,
    ) -> Result<Vec<u8>> {
        let stream_timeout = self.config.stream_timeout;

        tokio::time::timeout(stream_timeout, async {
            let (mut ack_tx, mut data_rx) = connection.accept_bi().await?;
            let result =
                stream::recv_chunk(&mut data_rx, &mut ack_tx, identity, expected_len).await;
            // Finish rather than drop so a queued failure ack still reaches
            // the sender instead of being discarded by a stream reset.
            let _ = ack_tx.finish();
            result
        })
        .await
        .map_err(|_| Error::Timeout(stream_timeout.as_secs()))?
    }

    fn output_path(&self, requested: &str) -> Result<PathBuf> {
        output_path(&self.output_dir, requested)
    }
}

/// Output path for a requested filename: the base name with the
/// `received_` prefix, any path components stripped.
fn output_path(output_dir: &Path, requested: &str) -> Result<PathBuf> {
    let base = Path::new(requested)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Protocol(format!("request carries no usable filename: '{requested}'"))
        })?;

    Ok(output_dir.join(format!("{OUTPUT_PREFIX}{base}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_plain_name() {
        let path = output_path(Path::new("."), "notes.txt").expect("path");
        assert_eq!(path, PathBuf::from("./received_notes.txt"));
    }

    #[test]
    fn test_output_path_strips_directories() {
        let path = output_path(Path::new("."), "/etc/../tmp/notes.txt").expect("path");
        assert_eq!(path, PathBuf::from("./received_notes.txt"));
    }

    #[test]
    fn test_output_path_rejects_unusable_names() {
        assert!(output_path(Path::new("."), "").is_err());
        assert!(output_path(Path::new("."), "..").is_err());
    }
}
