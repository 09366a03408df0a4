//! Ferry wire protocol.
//!
//! Two encodings share the connection:
//!
//! - **Control envelope**: one JSON request and one JSON response on the
//!   first (control) substream, each a tagged object whose `type` field is
//!   `TRANSFER_REQUEST` or `TRANSFER_RESPONSE`. JSON is self-delimiting, so
//!   the reader appends segments and re-attempts the parse until one
//!   succeeds; the response grows with the resume list, so no fixed-size
//!   buffer can hold it.
//! - **Chunk frame**: a fixed binary header on each data substream,
//!   followed by the raw payload and answered by a single ack byte.
//!
//! ## Chunk Frame Format
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────────────┐
//! │   Identity   │    Length    │    Digest    │   Payload   │
//! │  8 bytes BE  │  4 bytes BE  │   32 bytes   │  `L` bytes  │
//! └──────────────┴──────────────┴──────────────┴─────────────┘
//! ```
//!
//! followed by 1 ack byte in the reverse direction (`0x01` = accepted).

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::crypto::DIGEST_LEN;
use crate::error::{Error, Result};

/// Size of the fixed chunk-frame header in bytes.
pub const CHUNK_HEADER_LEN: usize = 44;

/// Acknowledgement byte for a verified chunk.
pub const ACK_OK: u8 = 0x01;

/// Acknowledgement byte for a chunk that failed verification.
pub const ACK_FAIL: u8 = 0x00;

/// Read granularity for the incremental control-message readers.
const CONTROL_READ_BUF: usize = 4096;

/// Discriminator carried in the `type` field of every control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Sender → receiver, opens the handshake
    #[serde(rename = "TRANSFER_REQUEST")]
    TransferRequest,
    /// Receiver → sender, closes the handshake
    #[serde(rename = "TRANSFER_RESPONSE")]
    TransferResponse,
}

/// Control message sent by the sender to initiate a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Message discriminator, always [`MessageType::TransferRequest`]
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Base name of the file being offered
    pub filename: String,
    /// Total file size in bytes
    pub filesize: u64,
    /// Hex-encoded SHA-256 digest of the whole file
    pub whole_file_digest: String,
    /// Chunk size the sender will use; the receiver must plan with it
    pub chunk_size: u64,
}

impl TransferRequest {
    /// Create a new transfer request.
    #[must_use]
    pub fn new(filename: String, filesize: u64, whole_file_digest: String, chunk_size: u64) -> Self {
        Self {
            msg_type: MessageType::TransferRequest,
            filename,
            filesize,
            whole_file_digest,
            chunk_size,
        }
    }
}

/// Control message sent by the receiver in answer to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    /// Message discriminator, always [`MessageType::TransferResponse`]
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Whether the receiver accepts the transfer
    pub accepted: bool,
    /// Chunk identities still needed, ascending; empty when rejected
    #[serde(default)]
    pub resume_chunks: Vec<u64>,
    /// Human-readable reason when rejected; empty when accepted
    #[serde(default)]
    pub rejection_reason: String,
}

impl TransferResponse {
    /// Create an accepting response carrying the resume list.
    #[must_use]
    pub fn accepted(resume_chunks: Vec<u64>) -> Self {
        Self {
            msg_type: MessageType::TransferResponse,
            accepted: true,
            resume_chunks,
            rejection_reason: String::new(),
        }
    }

    /// Create a rejecting response carrying the reason.
    #[must_use]
    pub fn rejected(reason: String) -> Self {
        Self {
            msg_type: MessageType::TransferResponse,
            accepted: false,
            resume_chunks: Vec::new(),
            rejection_reason: reason,
        }
    }
}

/// Encode a control message to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| Error::Protocol(format!("failed to serialize: {e}")))
}

/// Decode a transfer request, enforcing the discriminator.
///
/// # Errors
///
/// Returns an error if the bytes are not a complete request or the `type`
/// field is wrong.
pub fn decode_request(data: &[u8]) -> Result<TransferRequest> {
    let request: TransferRequest = serde_json::from_slice(data)
        .map_err(|e| Error::Protocol(format!("failed to deserialize transfer request: {e}")))?;

    if request.msg_type != MessageType::TransferRequest {
        return Err(Error::Protocol(
            "expected TRANSFER_REQUEST discriminator".to_string(),
        ));
    }

    Ok(request)
}

/// Decode a transfer response, enforcing the discriminator.
///
/// # Errors
///
/// Returns an error if the bytes are not a complete response or the `type`
/// field is wrong.
pub fn decode_response(data: &[u8]) -> Result<TransferResponse> {
    let response: TransferResponse = serde_json::from_slice(data)
        .map_err(|e| Error::Protocol(format!("failed to deserialize transfer response: {e}")))?;

    if response.msg_type != MessageType::TransferResponse {
        return Err(Error::Protocol(
            "expected TRANSFER_RESPONSE discriminator".to_string(),
        ));
    }

    Ok(response)
}

/// Whether a JSON parse failure means "keep reading" rather than "give up".
fn is_incomplete(data: &[u8]) -> bool {
    matches!(
        serde_json::from_slice::<serde_json::Value>(data),
        Err(ref e) if e.is_eof()
    )
}

/// Read a transfer request from a byte stream, parsing incrementally.
///
/// # Errors
///
/// Returns an error if the stream ends or the accumulated bytes form
/// something other than a valid request.
pub async fn read_request<R>(reader: &mut R) -> Result<TransferRequest>
where
    R: AsyncReadExt + Unpin,
{
    let data = read_until_complete(reader).await?;
    decode_request(&data)
}

/// Read a transfer response from a byte stream, parsing incrementally.
///
/// # Errors
///
/// Returns an error if the stream ends or the accumulated bytes form
/// something other than a valid response.
pub async fn read_response<R>(reader: &mut R) -> Result<TransferResponse>
where
    R: AsyncReadExt + Unpin,
{
    let data = read_until_complete(reader).await?;
    decode_response(&data)
}

/// Accumulate stream segments until they form one complete JSON value.
async fn read_until_complete<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
{
    let mut message = Vec::new();
    let mut buf = [0u8; CONTROL_READ_BUF];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if message.is_empty() {
                return Err(Error::Protocol(
                    "control stream closed before any message arrived".to_string(),
                ));
            }
            return Ok(message);
        }
        message.extend_from_slice(&buf[..n]);

        if !is_incomplete(&message) {
            return Ok(message);
        }
    }
}

/// The fixed-size header that precedes every chunk payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunk identity, 0-based within the whole file's chunking
    pub identity: u64,
    /// Payload length in bytes
    pub length: u32,
    /// SHA-256 digest of the payload
    pub digest: [u8; DIGEST_LEN],
}

impl ChunkHeader {
    /// Build a header for a payload, computing its digest.
    #[must_use]
    pub fn for_payload(identity: u64, payload: &[u8]) -> Self {
        Self {
            identity,
            length: payload.len() as u32,
            digest: crate::crypto::digest(payload),
        }
    }

    /// Encode the header to its wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.identity.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf[12..44].copy_from_slice(&self.digest);
        buf
    }

    /// Decode a header from its wire form.
    #[must_use]
    pub fn decode(buf: &[u8; CHUNK_HEADER_LEN]) -> Self {
        let identity = u64::from_be_bytes(buf[0..8].try_into().expect("8-byte slice"));
        let length = u32::from_be_bytes(buf[8..12].try_into().expect("4-byte slice"));
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&buf[12..44]);
        Self {
            identity,
            length,
            digest,
        }
    }

    /// Whether `payload` hashes to the digest announced in this header.
    #[must_use]
    pub fn verifies(&self, payload: &[u8]) -> bool {
        crate::crypto::digest(payload) == self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = TransferRequest::new(
            "video.mkv".to_string(),
            9_876_543_210,
            "ab".repeat(32),
            32 * 1024 * 1024,
        );

        let encoded = encode_message(&request).expect("encode");
        let decoded = decode_request(&encoded).expect("decode");

        assert_eq!(decoded.msg_type, MessageType::TransferRequest);
        assert_eq!(decoded.filename, request.filename);
        assert_eq!(decoded.filesize, request.filesize);
        assert_eq!(decoded.whole_file_digest, request.whole_file_digest);
        assert_eq!(decoded.chunk_size, request.chunk_size);
    }

    #[test]
    fn test_response_roundtrip_accepted() {
        let response = TransferResponse::accepted(vec![0, 3, 4, 7]);

        let encoded = encode_message(&response).expect("encode");
        let decoded = decode_response(&encoded).expect("decode");

        assert!(decoded.accepted);
        assert_eq!(decoded.resume_chunks, vec![0, 3, 4, 7]);
        assert!(decoded.rejection_reason.is_empty());
    }

    #[test]
    fn test_response_roundtrip_rejected() {
        let response = TransferResponse::rejected("User rejected the transfer".to_string());

        let encoded = encode_message(&response).expect("encode");
        let decoded = decode_response(&encoded).expect("decode");

        assert!(!decoded.accepted);
        assert!(decoded.resume_chunks.is_empty());
        assert_eq!(decoded.rejection_reason, "User rejected the transfer");
    }

    #[test]
    fn test_decode_wrong_discriminator() {
        let response = TransferResponse::accepted(vec![0]);
        let encoded = encode_message(&response).expect("encode");

        assert!(decode_request(&encoded).is_err());

        let request = TransferRequest::new("a".to_string(), 1, "00".repeat(32), 1024);
        let encoded = encode_message(&request).expect("encode");

        assert!(decode_response(&encoded).is_err());
    }

    #[test]
    fn test_decode_truncated_fails() {
        let request = TransferRequest::new("a".to_string(), 1, "00".repeat(32), 1024);
        let encoded = encode_message(&request).expect("encode");

        assert!(decode_request(&encoded[..encoded.len() - 5]).is_err());
    }

    #[tokio::test]
    async fn test_read_request_across_segments() {
        let request = TransferRequest::new(
            "archive.tar".to_string(),
            3072,
            "cd".repeat(32),
            1024,
        );
        let encoded = encode_message(&request).expect("encode");

        // Deliver the message in two writes through an in-memory pipe.
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let split = encoded.len() / 2;
        let (first, second) = (encoded[..split].to_vec(), encoded[split..].to_vec());

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(&first).await.expect("write first half");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx.write_all(&second).await.expect("write second half");
        });

        let decoded = read_request(&mut rx).await.expect("read request");
        writer.await.expect("writer task");

        assert_eq!(decoded.filename, "archive.tar");
        assert_eq!(decoded.filesize, 3072);
    }

    #[tokio::test]
    async fn test_read_response_large_resume_list() {
        // The resume list can make the response arbitrarily long; the
        // reader has to keep accumulating past any single segment.
        let response = TransferResponse::accepted((0..10_000).collect());
        let encoded = encode_message(&response).expect("encode");
        assert!(encoded.len() > CONTROL_READ_BUF);

        let (mut tx, mut rx) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            tx.write_all(&encoded).await.expect("write response");
        });

        let decoded = read_response(&mut rx).await.expect("read response");
        writer.await.expect("writer task");

        assert_eq!(decoded.resume_chunks.len(), 10_000);
        assert_eq!(decoded.resume_chunks[9_999], 9_999);
    }

    #[tokio::test]
    async fn test_read_request_empty_stream() {
        let (tx, mut rx) = tokio::io::duplex(64);
        drop(tx);

        assert!(read_request(&mut rx).await.is_err());
    }

    #[test]
    fn test_chunk_header_roundtrip() {
        let payload = b"some chunk payload";
        let header = ChunkHeader::for_payload(7, payload);

        let encoded = header.encode();
        let decoded = ChunkHeader::decode(&encoded);

        assert_eq!(decoded, header);
        assert_eq!(decoded.length as usize, payload.len());
        assert!(decoded.verifies(payload));
    }

    #[test]
    fn test_chunk_header_identity_wider_than_32_bits() {
        let header = ChunkHeader::for_payload((1 << 40) + 5, b"x");

        let encoded = header.encode();
        assert_eq!(&encoded[0..8], &((1u64 << 40) + 5).to_be_bytes());

        let decoded = ChunkHeader::decode(&encoded);
        assert_eq!(decoded.identity, (1 << 40) + 5);
    }

    #[test]
    fn test_chunk_header_detects_corruption() {
        let mut payload = b"payload under test".to_vec();
        let header = ChunkHeader::for_payload(0, &payload);

        payload[9] ^= 0x10;
        assert!(!header.verifies(&payload));
    }
}
