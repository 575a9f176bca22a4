//! Reply encoding (host → phone) and the canonical phone-packet encoder
//! used by tests and diagnostic tooling.

use crate::packet::{InputPacket, BUTTON_KEYS};
use serde::Serialize;
use serde_json::json;
use wheelhost_core::FeedbackState;

/// Wire shape of the reply. Field order is the declaration order.
#[derive(Serialize)]
struct ReplyWire {
    ack: u32,
    #[serde(rename = "rumbleL")]
    rumble_l: f64,
    #[serde(rename = "rumbleR")]
    rumble_r: f64,
    #[serde(rename = "trigL")]
    trig_l: f64,
    #[serde(rename = "trigR")]
    trig_r: f64,
    impact: f64,
    center: bool,
}

/// Round to three decimals; replies are compact and a phone-side slider
/// cannot resolve more anyway.
fn round3(x: f32) -> f64 {
    (x as f64 * 1000.0).round() / 1000.0
}

/// Serialize a feedback state as one compact JSON line (no trailing newline).
pub fn encode_reply(state: &FeedbackState) -> String {
    let wire = ReplyWire {
        ack: state.ack,
        rumble_l: round3(state.rumble_l.clamp(0.0, 1.0)),
        rumble_r: round3(state.rumble_r.clamp(0.0, 1.0)),
        trig_l: round3(state.trig_l.clamp(0.0, 1.0)),
        trig_r: round3(state.trig_r.clamp(0.0, 1.0)),
        impact: round3(state.impact.clamp(0.0, 1.0)),
        center: state.center,
    };
    // Serializing a plain struct of primitives cannot fail.
    serde_json::to_string(&wire).unwrap_or_default()
}

/// Encode a packet back into the phone's wire format. Recognized fields only;
/// used for protocol round-trip checks and for the packet replay tool.
pub fn encode_packet(packet: &InputPacket) -> String {
    let mut axis = json!({
        "throttle": packet.throttle,
        "brake": packet.brake,
        "latG": packet.lat_g,
        "ls_x": packet.ls_x,
        "ls_y": packet.ls_y,
    });
    if let Some(x) = packet.steering_x {
        axis["steering_x"] = json!(x);
    }
    if let Some(gy) = packet.gy {
        axis["gy"] = json!(gy);
    }
    if let Some(gz) = packet.gz {
        axis["gz"] = json!(gz);
    }

    let mut buttons = serde_json::Map::new();
    for (i, key) in BUTTON_KEYS.iter().enumerate() {
        if packet.buttons[i] {
            buttons.insert((*key).to_string(), json!(true));
        }
    }

    let mut meta = serde_json::Map::new();
    if packet.meta.hello {
        meta.insert("hello".into(), json!(true));
    }
    if packet.meta.screen_deg != 0 {
        meta.insert("screen_deg".into(), json!(packet.meta.screen_deg));
    }
    if let Some(d) = packet.meta.tilt_lock_deg {
        meta.insert("tiltLockDeg".into(), json!(d));
    }
    if let Some(d) = packet.meta.tilt_dead {
        meta.insert("tiltDead".into(), json!(d));
    }

    let root = json!({
        "sig": crate::SIGNATURE,
        "seq": packet.seq,
        "t": packet.t,
        "axis": axis,
        "buttons": buttons,
        "meta": meta,
    });
    root.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decoded, ProtocolCodec};
    use wheelhost_core::Button;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_reply_shape_and_order() -> TestResult {
        let reply = encode_reply(&FeedbackState {
            rumble_l: 0.5,
            rumble_r: 0.25,
            trig_l: 0.0,
            trig_r: 0.0,
            impact: 0.1234,
            center: true,
            ack: 42,
        });
        assert_eq!(
            reply,
            r#"{"ack":42,"rumbleL":0.5,"rumbleR":0.25,"trigL":0.0,"trigR":0.0,"impact":0.123,"center":true}"#
        );
        assert!(!reply.contains('\n'));
        Ok(())
    }

    #[test]
    fn test_reply_rounding_three_decimals() -> TestResult {
        let reply = encode_reply(&FeedbackState {
            rumble_l: 0.123_456,
            rumble_r: 0.999_9,
            ..Default::default()
        });
        let parsed: serde_json::Value = serde_json::from_str(&reply)?;
        assert_eq!(parsed["rumbleL"], 0.123);
        assert_eq!(parsed["rumbleR"], 1.0);
        Ok(())
    }

    #[test]
    fn test_reply_clamps_out_of_range() -> TestResult {
        let reply = encode_reply(&FeedbackState {
            rumble_l: 2.0,
            rumble_r: -1.0,
            ..Default::default()
        });
        let parsed: serde_json::Value = serde_json::from_str(&reply)?;
        assert_eq!(parsed["rumbleL"], 1.0);
        assert_eq!(parsed["rumbleR"], 0.0);
        Ok(())
    }

    #[test]
    fn test_packet_round_trip() -> TestResult {
        let mut buttons = [false; wheelhost_core::BUTTON_COUNT];
        buttons[Button::A.index()] = true;
        buttons[Button::Hb.index()] = true;
        let original = InputPacket {
            seq: 9,
            t: 5555,
            steering_x: Some(-0.25),
            throttle: 1.0,
            brake: 0.5,
            lat_g: 0.75,
            ls_x: 0.0,
            ls_y: 0.0,
            gy: None,
            gz: None,
            buttons,
            meta: crate::PacketMeta {
                hello: true,
                screen_deg: 270,
                tilt_lock_deg: Some(40.0),
                tilt_dead: Some(0.06),
            },
        };

        let wire = encode_packet(&original);
        let mut codec = ProtocolCodec::new();
        match codec.decode(wire.as_bytes()) {
            Decoded::HelloOrInput(decoded) => assert_eq!(decoded, original),
            other => panic!("expected telemetry, got {other:?}"),
        }
        Ok(())
    }
}
