//! Counters for the loss-tolerant paths. Transient I/O and protocol drift
//! are swallowed but never invisible: every drop lands in one of these.

use serde::Serialize;

/// Per-process counters, reset never, logged periodically by the session
/// loop. `lat_g` is the last observed lateral-G sample; it is surfaced here
/// for telemetry and feeds no output path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    /// Datagrams accepted as input/hello.
    pub accepted: u64,
    /// First byte was not `{` or the body failed to parse.
    pub not_json: u64,
    /// Parsed JSON without the expected signature.
    pub bad_signature: u64,
    /// Sequence number at or below the last accepted one.
    pub stale_seq: u64,
    /// Remote tuning packets (classified, counted, not applied).
    pub finetune: u64,
    /// Datagrams from a peer other than the pinned one.
    pub foreign_peer: u64,
    /// Transient UDP receive errors.
    pub udp_recv_errors: u64,
    /// Replies that could not be sent without blocking.
    pub reply_send_drops: u64,
    /// State lines dropped because the sidecar pipe was saturated.
    pub sidecar_write_drops: u64,
    /// Sidecar stdout lines that were not valid protocol messages.
    pub sidecar_garbage_lines: u64,
    /// Sidecar respawns performed.
    pub sidecar_respawns: u64,
    /// Bridge events discarded on queue overflow.
    pub bridge_queue_overflow: u64,
    /// Audio helper lines that failed to parse.
    pub audio_parse_errors: u64,
    /// Sessions established.
    pub sessions_started: u64,
    /// Sessions torn down (any reason).
    pub sessions_ended: u64,
    /// Last observed lateral acceleration from the phone.
    pub lat_g: f32,
}

impl SessionStats {
    /// Total datagrams dropped for protocol reasons.
    pub fn protocol_drops(&self) -> u64 {
        self.not_json + self.bad_signature + self.stale_seq + self.finetune + self.foreign_peer
    }
}
