//! The bound UDP socket with peer pinning.
//!
//! The endpoint neither retries nor buffers: the protocol is an idempotent
//! state push in both directions, so a lost datagram is repaired by the next
//! one. What the endpoint does own is the single-peer policy: the first
//! validated sender is pinned, stray LAN clients are dropped and counted,
//! and after an idle teardown the old peer keeps its claim for a short grace
//! window before the port opens up again.

use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
}

/// How long receive-error warnings are suppressed after one fires.
const ERROR_LOG_INTERVAL_MS: u64 = 2000;

pub struct UdpEndpoint {
    socket: UdpSocket,
    pinned: Option<SocketAddr>,
    /// Former peer still holding its claim, and the claim deadline.
    grace: Option<(SocketAddr, u64)>,
    recv_errors: u64,
    last_error_log_ms: u64,
}

impl UdpEndpoint {
    /// Bind the socket. Failure here is fatal to the daemon (exit 3).
    pub async fn bind(addr: SocketAddr) -> Result<Self, EndpointError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| EndpointError::Bind {
                port: addr.port(),
                source,
            })?;
        if let Ok(local) = socket.local_addr() {
            info!("UDP endpoint listening on {local}");
        }
        Ok(Self {
            socket,
            pinned: None,
            grace: None,
            recv_errors: 0,
            last_error_log_ms: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn pinned(&self) -> Option<SocketAddr> {
        self.pinned
    }

    /// Pin the flow to its first validated peer.
    pub fn pin(&mut self, peer: SocketAddr) {
        debug!("pinned to {peer}");
        self.pinned = Some(peer);
        self.grace = None;
    }

    /// Release the pin immediately (explicit disconnect, shutdown).
    pub fn release(&mut self) {
        self.pinned = None;
        self.grace = None;
    }

    /// Release the pin but let the old peer keep its claim until
    /// `until_ms`, so a stray client cannot steal the port from a phone
    /// that merely hiccupped.
    pub fn release_with_grace(&mut self, until_ms: u64) {
        if let Some(peer) = self.pinned.take() {
            self.grace = Some((peer, until_ms));
        }
    }

    /// Whether a datagram from `peer` may enter the protocol engine.
    pub fn accepts(&self, peer: SocketAddr, now_ms: u64) -> bool {
        if let Some(pinned) = self.pinned {
            return peer == pinned;
        }
        if let Some((old, until)) = self.grace {
            if now_ms < until {
                return peer == old;
            }
        }
        true
    }

    /// Non-blocking receive. `None` means nothing pending (or a transient
    /// error, which is counted and rate-limit logged).
    pub fn poll_recv(&mut self, buf: &mut [u8], now_ms: u64) -> Option<(usize, SocketAddr)> {
        match self.socket.try_recv_from(buf) {
            Ok((len, peer)) => Some((len, peer)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                self.recv_errors += 1;
                if now_ms.saturating_sub(self.last_error_log_ms) > ERROR_LOG_INTERVAL_MS {
                    warn!("UDP receive error (continuing): {e}");
                    self.last_error_log_ms = now_ms;
                }
                None
            }
        }
    }

    /// Non-blocking send; returns false when the datagram was dropped.
    pub fn send(&self, payload: &[u8], peer: SocketAddr) -> bool {
        match self.socket.try_send_to(payload, peer) {
            Ok(_) => true,
            Err(e) => {
                debug!("UDP send to {peer} dropped: {e}");
                false
            }
        }
    }

    pub fn recv_errors(&self) -> u64 {
        self.recv_errors
    }
}
