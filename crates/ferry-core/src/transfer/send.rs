//! Sender side of the chunked transfer protocol.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;

use crate::buffer::BufferPool;
use crate::crypto;
use crate::error::{Error, Result};
use crate::plan;
use crate::protocol::{self, TransferRequest};
use crate::stream;
use crate::transport;

use super::{
    pace, Outcome, ProgressFeed, TransferConfig, TransferProgress, TransferReport, TransferState,
    FINAL_SETTLE,
};

/// A sending session: one file, one peer, one connection.
pub struct SendSession {
    source: PathBuf,
    filename: String,
    peer: std::net::SocketAddr,
    config: TransferConfig,
    pool: BufferPool,
    progress: ProgressFeed,
    retries: u32,
}

impl std::fmt::Debug for SendSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendSession")
            .field("source", &self.source)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl SendSession {
    /// Create a session for sending `source` to `peer`.
    ///
    /// `peer` is an endpoint string (`HOST`, `IP`, `IP:PORT`, ...); a
    /// missing port defaults to the transfer port.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a regular file or the peer
    /// address cannot be resolved.
    pub async fn new(source: &Path, peer: &str, config: TransferConfig) -> Result<Self> {
        let metadata = tokio::fs::metadata(source).await?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "not a regular file: {}",
                source.display()
            )));
        }

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::InvalidInput(format!("no usable file name in {}", source.display()))
            })?;

        let peer = transport::resolve_peer_addr(peer, crate::DEFAULT_TRANSFER_PORT).await?;

        let pool_size = usize::try_from(config.buffer_threshold).unwrap_or(usize::MAX);
        Ok(Self {
            source: source.to_path_buf(),
            filename,
            peer,
            pool: BufferPool::new(pool_size),
            config,
            progress: ProgressFeed::new(),
            retries: 0,
        })
    }

    /// Subscribe to progress snapshots.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Run the session to completion, rejection, or failure.
    ///
    /// # Errors
    ///
    /// Returns an error on any protocol, transport, integrity, or I/O
    /// failure once the retry engine is exhausted. A rejection by the
    /// receiver is reported as [`Outcome::Rejected`], not an error.
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
        let endpoint = transport::client_endpoint(self.config.keepalive)?;
        let connection = transport::connect(&endpoint, self.peer).await?;

        self.progress.set_state(TransferState::Handshaking);
        let (mut ctrl_tx, mut ctrl_rx) = connection.open_bi().await?;

        let filesize = tokio::fs::metadata(&self.source).await?.len();
        let digest = crypto::digest_file(&self.source).await?;

        let request = TransferRequest::new(
            self.filename.clone(),
            filesize,
            crypto::digest_hex(&digest),
            self.config.chunk_size,
        );
        ctrl_tx
            .write_all(&protocol::encode_message(&request)?)
            .await
            .map_err(|e| Error::Transport(format!("failed to send transfer request: {e}")))?;

        tracing::info!(
            file = %self.filename,
            size = filesize,
            peer = %self.peer,
            "transfer request sent, waiting for response"
        );

        let response = protocol::read_response(&mut ctrl_rx).await?;

        if !response.accepted {
            tracing::info!(reason = %response.rejection_reason, "transfer rejected by peer");
            self.progress.set_state(TransferState::Rejected);
            connection.close(transport::CLOSE_DONE.into(), b"rejected");
            endpoint.wait_idle().await;
            return Ok(Outcome::Rejected {
                reason: response.rejection_reason,
            });
        }

        let ranges: Vec<(u64, Range<u64>)> = response
            .resume_chunks
            .iter()
            .map(|&identity| {
                (
                    identity,
                    plan::chunk_range(identity, filesize, self.config.chunk_size),
                )
            })
            .collect();
        let bytes_total: u64 = ranges.iter().map(|(_, r)| r.end - r.start).sum();
        self.progress
            .set_totals(response.resume_chunks.len() as u64, bytes_total);

        tracing::info!(
            chunks = response.resume_chunks.len(),
            bytes = bytes_total,
            "transfer accepted"
        );

        self.progress.set_state(TransferState::Transferring);
        let mut file = tokio::fs::File::open(&self.source).await?;

        for (position, (identity, range)) in ranges.iter().enumerate() {
            // An empty range means the receiver asked for a chunk past the
            // data we have; it is already satisfied by definition.
            if range.is_empty() {
                self.progress.add_chunk(0);
                continue;
            }

            self.send_chunk_with_retry(&connection, &mut file, *identity, range.clone())
                .await?;

            self.progress.add_chunk(range.end - range.start);
            pace(position).await;
        }

        // Give the receiver time to finish its final write.
        tokio::time::sleep(FINAL_SETTLE).await;

        connection.close(transport::CLOSE_DONE.into(), b"done");
        endpoint.wait_idle().await;

        self.progress.set_state(TransferState::Completed);
        tracing::info!(file = %self.filename, "transfer completed");

        Ok(Outcome::Completed(TransferReport {
            filename: self.filename.clone(),
            filesize,
            chunks_planned: ranges.len() as u64,
            bytes_moved: bytes_total,
            retries: self.retries,
            duration: started.elapsed(),
        }))
    }

    /// Send one chunk, retrying transient failures up to the configured
    /// attempt count. Every attempt re-seeks and re-reads the source range
    /// so a torn read cannot survive into a retry.
    async fn send_chunk_with_retry(
        &mut self,
        connection: &quinn::Connection,
        file: &mut tokio::fs::File,
        identity: u64,
        range: Range<u64>,
    ) -> Result<()> {
        let mut last_err = None;

        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                self.retries += 1;
                tracing::warn!(
                    chunk = identity,
                    attempt,
                    max = self.config.max_retries,
                    "retrying chunk"
                );
            }

            match self
                .try_send_chunk(connection, file, identity, range.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(chunk = identity, attempt, "chunk attempt failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(Error::ChunkRejected { identity }))
    }

    async fn try_send_chunk(
        &self,
        connection: &quinn::Connection,
        file: &mut tokio::fs::File,
        identity: u64,
        range: Range<u64>,
    ) -> Result<()> {
        let len = usize::try_from(range.end - range.start)
            .map_err(|_| Error::InvalidInput("chunk does not fit in memory".to_string()))?;

        let pooled = range.end - range.start <= self.config.buffer_threshold;
        let mut buf = if pooled {
            self.pool.get()
        } else {
            vec![0u8; len]
        };

        let result = Self::exchange_chunk(
            connection,
            file,
            identity,
            range,
            &mut buf[..len],
            self.config.stream_timeout,
        )
        .await;

        if pooled {
            self.pool.put(buf);
        }
        result
    }

    async fn exchange_chunk(
        connection: &quinn::Connection,
        file: &mut tokio::fs::File,
        identity: u64,
        range: Range<u64>,
        buf: &mut [u8],
        stream_timeout: std::time::Duration,
    ) -> Result<()> {
        file.seek(std::io::SeekFrom::Start(range.start)).await?;
        file.read_exact(buf).await?;

        tokio::time::timeout(stream_timeout, async {
            let (mut data_tx, mut ack_rx) = connection.open_bi().await?;
            stream::send_chunk(&mut data_tx, &mut ack_rx, identity, buf).await?;
            let _ = data_tx.finish();
            Ok(())
        })
        .await
        .map_err(|_| Error::Timeout(stream_timeout.as_secs()))?
    }
}
