//! Datagram classification and the per-session sequence guard.

use crate::packet::{loose_u32, packet_from_value, InputPacket};
use serde_json::Value;
use tracing::debug;

/// Signature literal every telemetry packet must carry.
pub const SIGNATURE: &str = "WHEEL1";

/// Why a datagram was dropped without affecting the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a JSON object (first byte) or failed to parse.
    NotJson,
    /// Parsed JSON without the telemetry signature.
    BadSignature,
    /// Sequence at or below the last accepted one.
    StaleSeq,
    /// Remote tuning message; classified and counted, never applied.
    FineTune,
}

/// Classification of one received datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A validated telemetry packet (`meta.hello` marks session starts).
    HelloOrInput(InputPacket),
    /// Peer-declared end of session.
    Disconnect,
    /// Phone went to background: freeze outputs, keep the session.
    Background,
    /// Dropped; the reason feeds the drop counters.
    Ignore(IgnoreReason),
}

/// Stateful decoder: owns the last accepted sequence number of the active
/// session. Reset on teardown so a reconnecting phone may restart its
/// counter.
#[derive(Debug, Default)]
pub struct ProtocolCodec {
    last_seq: Option<u32>,
}

impl ProtocolCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted sequence, if any packet was accepted this session.
    pub fn last_seq(&self) -> Option<u32> {
        self.last_seq
    }

    /// Forget the session's sequence state.
    pub fn reset(&mut self) {
        self.last_seq = None;
    }

    /// Classify one datagram payload. Accepting a telemetry packet advances
    /// the sequence guard; every other outcome leaves it untouched.
    pub fn decode(&mut self, payload: &[u8]) -> Decoded {
        if payload.first() != Some(&b'{') {
            return Decoded::Ignore(IgnoreReason::NotJson);
        }
        let text = String::from_utf8_lossy(payload);
        let root: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                debug!("datagram parse failure: {e}");
                return Decoded::Ignore(IgnoreReason::NotJson);
            }
        };
        if !root.is_object() {
            return Decoded::Ignore(IgnoreReason::NotJson);
        }

        // Control messages take priority over the signature check.
        match root.get("type").and_then(Value::as_str) {
            Some("disconnect") | Some("destroy") => return Decoded::Disconnect,
            Some("inbackground") => return Decoded::Background,
            Some("finetune") => return Decoded::Ignore(IgnoreReason::FineTune),
            _ => {}
        }

        if root.get("sig").and_then(Value::as_str) != Some(SIGNATURE) {
            return Decoded::Ignore(IgnoreReason::BadSignature);
        }

        let seq = loose_u32(root.get("seq"), 0);
        if let Some(last) = self.last_seq {
            if seq <= last {
                debug!(seq, last, "stale sequence dropped");
                return Decoded::Ignore(IgnoreReason::StaleSeq);
            }
        }
        self.last_seq = Some(seq);

        Decoded::HelloOrInput(packet_from_value(&root, seq))
    }
}
