//! Cryptographic primitives for Ferry.
//!
//! This module provides:
//! - SHA-256 digests for chunk and whole-file integrity
//! - TLS 1.3 material for the QUIC transport
//!
//! ## Security Model
//!
//! The transport is encrypted with an ephemeral self-signed certificate on
//! the receiver and an accept-any verifier on the sender. Peers are not
//! authenticated by certificate; the receiving user vets each transfer
//! through the confirmation prompt, and payload integrity is enforced
//! end-to-end by the per-chunk and whole-file digests.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// ALPN protocol identifier for Ferry connections.
pub const ALPN: &[u8] = b"ferry/1";

/// Size in bytes of the digests used throughout the protocol.
pub const DIGEST_LEN: usize = 32;

/// Read buffer size for whole-file hashing.
const HASH_READ_BUF: usize = 64 * 1024;

/// Compute the SHA-256 digest of a buffer.
#[must_use]
pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 digest of a file's full contents.
///
/// Streams the file through the hasher so arbitrarily large files never
/// need to fit in memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn digest_file(path: &Path) -> Result<[u8; DIGEST_LEN]> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_READ_BUF];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// Render a digest as lowercase hex, the form carried in control messages.
#[must_use]
pub fn digest_hex(digest: &[u8; DIGEST_LEN]) -> String {
    hex::encode(digest)
}

/// Build the rustls server configuration for the receiving endpoint.
///
/// Generates an ephemeral self-signed certificate; nothing is persisted.
///
/// # Errors
///
/// Returns an error if certificate generation or configuration fails.
pub fn server_tls_config() -> Result<rustls::ServerConfig> {
    let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    let cert_params = rcgen::CertificateParams::new(subject_alt_names)
        .map_err(|e| Error::Tls(format!("failed to create cert params: {e}")))?;

    let key_pair = rcgen::KeyPair::generate()
        .map_err(|e| Error::Tls(format!("failed to generate key pair: {e}")))?;

    let cert = cert_params
        .self_signed(&key_pair)
        .map_err(|e| Error::Tls(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = rustls::pki_types::CertificateDer::from(cert.der().to_vec());
    let key_der = rustls::pki_types::PrivateKeyDer::try_from(key_pair.serialize_der())
        .map_err(|e| Error::Tls(format!("failed to convert private key: {e}")))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .map_err(|e| Error::Tls(format!("failed to build server config: {e}")))?;
    config.alpn_protocols = vec![ALPN.to_vec()];

    Ok(config)
}

/// Build the rustls client configuration for the sending endpoint.
///
/// The client accepts self-signed certificates, which is necessary for
/// Ferry's peer-to-peer model.
pub fn client_tls_config() -> rustls::ClientConfig {
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertVerifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN.to_vec()];
    config
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct AcceptAnyCertVerifier;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            digest_hex(&digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_digest_file_matches_buffer_digest() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).expect("write file");

        let file_digest = digest_file(&path).await.expect("hash file");
        assert_eq!(file_digest, digest(&content));
    }

    #[tokio::test]
    async fn test_digest_file_empty() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("empty.bin");
        std::fs::write(&path, b"").expect("write file");

        let file_digest = digest_file(&path).await.expect("hash file");
        assert_eq!(file_digest, digest(b""));
    }

    #[test]
    fn test_tls_configs_build() {
        let server = server_tls_config().expect("server config");
        assert_eq!(server.alpn_protocols, vec![ALPN.to_vec()]);

        let client = client_tls_config();
        assert_eq!(client.alpn_protocols, vec![ALPN.to_vec()]);
    }
}
