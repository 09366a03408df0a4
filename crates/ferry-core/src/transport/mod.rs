//! QUIC transport endpoints.
//!
//! The transport is a multiplexed QUIC connection over UDP: the receiver
//! binds a server endpoint on the transfer port, the sender dials it with a
//! client endpoint that trusts the receiver's ephemeral certificate. All
//! substream semantics live in [`crate::stream`]; this module only
//! constructs endpoints and resolves peer endpoint strings.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};

use crate::crypto;
use crate::error::{Error, Result};

/// Application close code for a session that finished normally.
pub const CLOSE_DONE: u32 = 0;

/// SNI name sent by the client; not verified, the accept-any model applies.
const SERVER_NAME: &str = "localhost";

/// Bind the server endpoint for receiving transfers.
///
/// Listens on `0.0.0.0:port`; pass port 0 to let the OS choose (used by
/// tests). The keep-alive interval is handed to QUIC so idle connections
/// survive confirmation prompts.
///
/// # Errors
///
/// Returns an error if TLS material cannot be built or the UDP socket
/// cannot be bound.
pub fn server_endpoint(port: u16, keepalive: Duration) -> Result<quinn::Endpoint> {
    let tls = crypto::server_tls_config()?;
    let quic_tls = QuicServerConfig::try_from(tls)
        .map_err(|e| Error::Tls(format!("unusable server TLS config: {e}")))?;

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_tls));
    server_config.transport_config(transport_config(keepalive));

    let endpoint = quinn::Endpoint::server(server_config, SocketAddr::from(([0, 0, 0, 0], port)))?;
    Ok(endpoint)
}

/// Create the client endpoint for sending transfers.
///
/// # Errors
///
/// Returns an error if TLS material cannot be built or the UDP socket
/// cannot be bound.
pub fn client_endpoint(keepalive: Duration) -> Result<quinn::Endpoint> {
    let mut endpoint = quinn::Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))?;

    let quic_tls = QuicClientConfig::try_from(crypto::client_tls_config())
        .map_err(|e| Error::Tls(format!("unusable client TLS config: {e}")))?;

    let mut client_config = quinn::ClientConfig::new(Arc::new(quic_tls));
    client_config.transport_config(transport_config(keepalive));
    endpoint.set_default_client_config(client_config);

    Ok(endpoint)
}

fn transport_config(keepalive: Duration) -> Arc<quinn::TransportConfig> {
    let mut transport = quinn::TransportConfig::default();
    transport.keep_alive_interval(Some(keepalive));
    Arc::new(transport)
}

/// Dial a peer and wait for the connection to become ready.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(endpoint: &quinn::Endpoint, addr: SocketAddr) -> Result<quinn::Connection> {
    let connection = endpoint.connect(addr, SERVER_NAME)?.await?;
    tracing::debug!(peer = %addr, "QUIC connection established");
    Ok(connection)
}

/// Resolve a peer endpoint string to a socket address.
///
/// Accepts `IP`, `IP:PORT`, `[IPv6]`, `[IPv6]:PORT`, `HOST` and
/// `HOST:PORT`; a missing port falls back to `default_port`. Hostnames are
/// resolved through the system resolver.
///
/// # Errors
///
/// Returns an error if the string cannot be parsed or resolved.
pub async fn resolve_peer_addr(peer: &str, default_port: u16) -> Result<SocketAddr> {
    let peer = peer.trim();

    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Some(ip_str) = peer.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| invalid_peer(peer))?;
        return Ok(SocketAddr::new(ip, default_port));
    }

    if let Ok(ip) = peer.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let (host, port) = match peer.rsplit_once(':') {
        // A lone colon-separated pair is host:port; anything with more
        // colons would be an unbracketed IPv6 literal, rejected above.
        Some((host, port_str)) if !host.contains(':') => {
            let port: u16 = port_str.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "invalid port '{port_str}' in peer address '{peer}'"
                ))
            })?;
            (host, port)
        }
        Some(_) => return Err(invalid_peer(peer)),
        None => (peer, default_port),
    };

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| invalid_peer(peer))?
        .next()
        .ok_or_else(|| invalid_peer(peer))
}

fn invalid_peer(peer: &str) -> Error {
    Error::InvalidInput(format!(
        "invalid peer address '{peer}'; use HOST, IP or IP:PORT (e.g. 192.168.1.50 or 192.168.1.50:8080)"
    ))
}
