//! Substream I/O for single chunks.
//!
//! Each data substream carries exactly one chunk frame and one
//! acknowledgement byte, then both sides close it. The helpers are generic
//! over the tokio I/O traits so they run unchanged over QUIC streams and
//! over in-memory pipes in tests.
//!
//! The acknowledgement is end-to-end: a chunk counts as delivered only once
//! the sender has read [`ACK_OK`](crate::protocol::ACK_OK) back on the same
//! substream, which the receiver writes only after its digest check passed.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::{ChunkHeader, ACK_FAIL, ACK_OK, CHUNK_HEADER_LEN};

/// Send one chunk and wait for the acknowledgement byte.
///
/// Writes the 44-byte header followed by the payload, then blocks on the
/// single ack byte from the peer.
///
/// # Errors
///
/// Returns an error if writing fails, the stream ends before the ack
/// arrives, or the ack byte is anything other than `0x01`.
pub async fn send_chunk<W, R>(
    writer: &mut W,
    reader: &mut R,
    identity: u64,
    payload: &[u8],
) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    R: AsyncReadExt + Unpin,
{
    let header = ChunkHeader::for_payload(identity, payload);

    writer.write_all(&header.encode()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;

    let mut ack = [0u8; 1];
    reader.read_exact(&mut ack).await?;

    if ack[0] != ACK_OK {
        return Err(Error::ChunkRejected { identity });
    }

    Ok(())
}

/// Receive one chunk, verify it, and acknowledge.
///
/// Reads exactly the 44-byte header, enforces that it names
/// `expected_identity` and carries exactly `expected_len` payload bytes,
/// then reads the payload and checks it against the header digest. Only a
/// verified chunk is acknowledged with `0x01`; on a digest mismatch a
/// failure byte is written back (best effort) so the sender can retry.
///
/// # Errors
///
/// Returns an error on short reads, an unexpected identity, a payload
/// length that differs from the planned chunk length, or a digest mismatch.
pub async fn recv_chunk<R, W>(
    reader: &mut R,
    writer: &mut W,
    expected_identity: u64,
    expected_len: u64,
) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let mut header_buf = [0u8; CHUNK_HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;
    let header = ChunkHeader::decode(&header_buf);

    if header.identity != expected_identity {
        return Err(Error::UnexpectedChunk {
            expected: expected_identity,
            actual: header.identity,
        });
    }

    if u64::from(header.length) != expected_len {
        return Err(Error::Protocol(format!(
            "chunk {} carries {} bytes, planned length is {}",
            header.identity, header.length, expected_len
        )));
    }

    let mut payload = vec![0u8; header.length as usize];
    reader.read_exact(&mut payload).await?;

    if !header.verifies(&payload) {
        let _ = writer.write_all(&[ACK_FAIL]).await;
        let _ = writer.flush().await;
        return Err(Error::ChunkDigestMismatch {
            identity: header.identity,
        });
    }

    writer.write_all(&[ACK_OK]).await?;
    writer.flush().await?;

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChunkHeader;

    /// Two crossed in-memory pipes standing in for one bidirectional stream.
    fn stream_pair() -> (
        (tokio::io::DuplexStream, tokio::io::DuplexStream),
        (tokio::io::DuplexStream, tokio::io::DuplexStream),
    ) {
        let (sender_tx, receiver_rx) = tokio::io::duplex(64 * 1024);
        let (receiver_tx, sender_rx) = tokio::io::duplex(64 * 1024);
        ((sender_tx, sender_rx), (receiver_tx, receiver_rx))
    }

    #[tokio::test]
    async fn test_chunk_roundtrip() {
        let ((mut s_tx, mut s_rx), (mut r_tx, mut r_rx)) = stream_pair();
        let payload = b"This is a test file for chunked transfer.".to_vec();
        let len = payload.len() as u64;

        let sender = tokio::spawn(async move {
            send_chunk(&mut s_tx, &mut s_rx, 0, &payload).await
        });

        let received = recv_chunk(&mut r_rx, &mut r_tx, 0, len)
            .await
            .expect("recv chunk");

        assert_eq!(received, b"This is a test file for chunked transfer.");
        sender.await.expect("join").expect("send chunk");
    }

    #[tokio::test]
    async fn test_unexpected_identity_fails() {
        let ((mut s_tx, mut s_rx), (mut r_tx, mut r_rx)) = stream_pair();

        let sender = tokio::spawn(async move {
            // The receiver never acks, so the send side errors out when the
            // pipes close.
            let _ = send_chunk(&mut s_tx, &mut s_rx, 3, b"data").await;
        });

        let result = recv_chunk(&mut r_rx, &mut r_tx, 4, 4).await;
        assert!(matches!(
            result,
            Err(Error::UnexpectedChunk {
                expected: 4,
                actual: 3
            })
        ));

        drop(r_tx);
        sender.await.expect("join");
    }

    #[tokio::test]
    async fn test_length_mismatch_fails() {
        let ((mut s_tx, mut s_rx), (mut r_tx, mut r_rx)) = stream_pair();

        let sender = tokio::spawn(async move {
            let _ = send_chunk(&mut s_tx, &mut s_rx, 0, b"short").await;
        });

        let result = recv_chunk(&mut r_rx, &mut r_tx, 0, 1024).await;
        assert!(matches!(result, Err(Error::Protocol(_))));

        drop(r_tx);
        sender.await.expect("join");
    }

    #[tokio::test]
    async fn test_corrupted_payload_rejected() {
        let ((mut s_tx, mut s_rx), (mut r_tx, mut r_rx)) = stream_pair();

        let payload = b"payload that will be corrupted in transit".to_vec();
        let len = payload.len() as u64;
        let header = ChunkHeader::for_payload(0, &payload);

        let sender = tokio::spawn(async move {
            // Flip one bit in the middle after the digest was computed.
            let mut corrupted = payload;
            let mid = corrupted.len() / 2;
            corrupted[mid] ^= 0x01;

            s_tx.write_all(&header.encode()).await.expect("write header");
            s_tx.write_all(&corrupted).await.expect("write payload");

            let mut ack = [0u8; 1];
            s_rx.read_exact(&mut ack).await.expect("read ack");
            ack[0]
        });

        let result = recv_chunk(&mut r_rx, &mut r_tx, 0, len).await;
        assert!(matches!(
            result,
            Err(Error::ChunkDigestMismatch { identity: 0 })
        ));

        let ack = sender.await.expect("join");
        assert_ne!(ack, ACK_OK);
    }

    #[tokio::test]
    async fn test_sender_fails_on_rejection_ack() {
        let ((mut s_tx, mut s_rx), (mut r_tx, mut r_rx)) = stream_pair();

        let receiver = tokio::spawn(async move {
            let mut header = [0u8; CHUNK_HEADER_LEN];
            r_rx.read_exact(&mut header).await.expect("read header");
            let decoded = ChunkHeader::decode(&header);
            let mut payload = vec![0u8; decoded.length as usize];
            r_rx.read_exact(&mut payload).await.expect("read payload");

            r_tx.write_all(&[ACK_FAIL]).await.expect("write ack");
        });

        let result = send_chunk(&mut s_tx, &mut s_rx, 9, b"data").await;
        assert!(matches!(result, Err(Error::ChunkRejected { identity: 9 })));

        receiver.await.expect("join");
    }
}
