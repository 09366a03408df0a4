//! Peer discovery via UDP broadcast.
//!
//! A probing peer broadcasts a fixed probe string on the discovery port and
//! collects JSON replies for a short window; every listening peer answers
//! with its hostname and transfer endpoint. Discovery is best-effort and
//! optional; the transfer protocol itself only needs an endpoint string,
//! which can also be supplied directly.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::error::Result;

/// UDP port probed for peer discovery.
pub const DISCOVERY_PORT: u16 = 8888;

/// Probe payload broadcast by a discovering peer.
pub const DISCOVERY_PROBE: &[u8] = b"FERRY_DISCOVERY";

/// How long to collect replies after a probe.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// A peer that answered a discovery probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    /// The peer's hostname
    pub hostname: String,
    /// The peer's transfer endpoint as `IP:port`
    pub addr: String,
}

/// Broadcast a probe and collect peer replies.
///
/// Replies are deduplicated by hostname and returned in hostname order.
///
/// # Errors
///
/// Returns an error if the probe socket cannot be created or the broadcast
/// cannot be sent.
pub async fn discover_peers(discovery_port: u16, reply_window: Duration) -> Result<Vec<Peer>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;

    let broadcast = SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), discovery_port);
    socket.send_to(DISCOVERY_PROBE, broadcast).await?;
    tracing::debug!(port = discovery_port, "discovery probe sent");

    let mut peers: BTreeMap<String, Peer> = BTreeMap::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + reply_window;

    loop {
        let recv = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        match recv {
            Ok(Ok((n, source))) => {
                if let Ok(peer) = serde_json::from_slice::<Peer>(&buf[..n]) {
                    tracing::debug!(hostname = %peer.hostname, %source, "peer replied");
                    peers.insert(peer.hostname.clone(), peer);
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("discovery read failed: {e}");
                break;
            }
            // Reply window elapsed.
            Err(_) => break,
        }
    }

    Ok(peers.into_values().collect())
}

/// Background task answering discovery probes for this host.
#[derive(Debug)]
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl DiscoveryResponder {
    /// Bind the discovery port and start answering probes.
    ///
    /// Replies advertise `transfer_port` together with this machine's
    /// preferred outbound IP.
    ///
    /// # Errors
    ///
    /// Returns an error if the discovery port cannot be bound (commonly
    /// because another Ferry instance already answers on this machine).
    pub async fn spawn(discovery_port: u16, transfer_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, discovery_port)).await?;
        let local_addr = socket.local_addr()?;

        let hostname = hostname::get()
            .map_or_else(|_| "unknown".to_string(), |h| h.to_string_lossy().to_string());

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let Ok((n, source)) = socket.recv_from(&mut buf).await else {
                    continue;
                };

                if &buf[..n] != DISCOVERY_PROBE {
                    continue;
                }

                let reply = Peer {
                    hostname: hostname.clone(),
                    addr: format!("{}:{transfer_port}", local_ip().await),
                };

                match serde_json::to_vec(&reply) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, source).await {
                            tracing::debug!("discovery reply to {source} failed: {e}");
                        }
                    }
                    Err(e) => tracing::debug!("discovery reply encode failed: {e}"),
                }
            }
        });

        tracing::debug!(%local_addr, "discovery responder listening");
        Ok(Self { local_addr, task })
    }

    /// The bound discovery socket address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for DiscoveryResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// This machine's preferred outbound IPv4 address.
///
/// Opens a connected UDP socket towards a public address to let the OS pick
/// the outbound interface; nothing is transmitted.
async fn local_ip() -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);

    let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await else {
        return fallback;
    };
    if socket.connect(("8.8.8.8", 80)).await.is_err() {
        return fallback;
    }
    socket.local_addr().map_or(fallback, |addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_roundtrip() {
        let peer = Peer {
            hostname: "workstation".to_string(),
            addr: "192.168.1.50:8080".to_string(),
        };

        let encoded = serde_json::to_vec(&peer).expect("encode");
        let decoded: Peer = serde_json::from_slice(&encoded).expect("decode");
        assert_eq!(decoded, peer);
    }

    #[tokio::test]
    async fn test_responder_answers_probe() {
        // Ephemeral port so the test does not collide with a running peer.
        let responder = DiscoveryResponder::spawn(0, 8080).await.expect("spawn");
        let port = responder.local_addr().port();

        let prober = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .expect("bind prober");
        prober
            .send_to(DISCOVERY_PROBE, (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send probe");

        let mut buf = [0u8; 1024];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), prober.recv_from(&mut buf))
            .await
            .expect("reply within timeout")
            .expect("recv reply");

        let peer: Peer = serde_json::from_slice(&buf[..n]).expect("decode reply");
        assert!(peer.addr.ends_with(":8080"));
    }

    #[tokio::test]
    async fn test_responder_ignores_other_traffic() {
        let responder = DiscoveryResponder::spawn(0, 8080).await.expect("spawn");
        let port = responder.local_addr().port();

        let prober = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .expect("bind prober");
        prober
            .send_to(b"unrelated datagram", (Ipv4Addr::LOCALHOST, port))
            .await
            .expect("send noise");

        let mut buf = [0u8; 1024];
        let reply = tokio::time::timeout(Duration::from_millis(300), prober.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "noise must not be answered");
    }
}
