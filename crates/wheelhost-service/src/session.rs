//! Per-peer session state.

use std::fmt;
use std::net::SocketAddr;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Peer-declared disconnect.
    Disconnect,
    /// Datagram silence beyond the idle timeout.
    IdleTimeout,
    /// Host shutting down.
    Shutdown,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeardownReason::Disconnect => "disconnect",
            TeardownReason::IdleTimeout => "idle timeout",
            TeardownReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// One live phone session. At most one exists at any instant.
#[derive(Debug, Clone)]
pub struct Session {
    pub peer: SocketAddr,
    pub established_ms: u64,
    pub last_rx_ms: u64,
    /// Last accepted telemetry sequence; acked in every reply.
    pub last_seq: u32,
    /// Phone reported itself backgrounded: outputs frozen at neutral,
    /// session and replies continue.
    pub background: bool,
}

impl Session {
    pub fn new(peer: SocketAddr, now_ms: u64) -> Self {
        Self {
            peer,
            established_ms: now_ms,
            last_rx_ms: now_ms,
            last_seq: 0,
            background: false,
        }
    }

    /// Refresh liveness on any datagram from the pinned peer.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_rx_ms = now_ms;
    }

    pub fn is_idle(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_rx_ms) > idle_timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:9999".parse().expect("valid addr")
    }

    #[test]
    fn test_idle_detection() {
        let mut session = Session::new(peer(), 1000);
        assert!(!session.is_idle(1000, 3000));
        assert!(!session.is_idle(4000, 3000));
        assert!(session.is_idle(4001, 3000));
        session.touch(5000);
        assert!(!session.is_idle(7000, 3000));
    }

    #[test]
    fn test_new_session_is_foreground() {
        let session = Session::new(peer(), 0);
        assert!(!session.background);
        assert_eq!(session.last_seq, 0);
    }
}
