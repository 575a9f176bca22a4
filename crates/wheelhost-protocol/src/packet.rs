//! Telemetry packet model and the tolerant JSON extraction behind it.

use serde_json::Value;
use wheelhost_core::{Button, BUTTON_COUNT};

/// Session-scoped tuning and lifecycle hints carried in `meta`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacketMeta {
    /// First packet of a connection attempt.
    pub hello: bool,
    /// Phone screen rotation in degrees; 270 flips tilt parity.
    pub screen_deg: u32,
    /// Full-lock tilt angle in degrees for host-side steering.
    pub tilt_lock_deg: Option<f32>,
    /// Phone-requested steering deadzone.
    pub tilt_dead: Option<f32>,
}

/// A validated, clamped telemetry packet.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPacket {
    pub seq: u32,
    /// Sender timestamp in ms. Informational only.
    pub t: u64,
    /// Lock-normalized steering, when the phone computed it.
    pub steering_x: Option<f32>,
    pub throttle: f32,
    pub brake: f32,
    /// Lateral acceleration. Surfaced to telemetry, never mapped to outputs.
    pub lat_g: f32,
    pub ls_x: f32,
    pub ls_y: f32,
    /// Raw gravity components for host-side tilt when `steering_x` is absent.
    pub gy: Option<f32>,
    pub gz: Option<f32>,
    pub buttons: [bool; BUTTON_COUNT],
    pub meta: PacketMeta,
}

impl InputPacket {
    pub fn button(&self, b: Button) -> bool {
        self.buttons[b.index()]
    }

    /// Buttons as the 13-bit mask in canonical layout.
    pub fn button_mask(&self) -> u16 {
        let mut mask = 0u16;
        for b in Button::ALL {
            if self.buttons[b.index()] {
                mask |= b.bit();
            }
        }
        mask
    }
}

/// JSON field name for each button, in bit order.
pub(crate) const BUTTON_KEYS: [&str; BUTTON_COUNT] = [
    "A",
    "B",
    "X",
    "Y",
    "LB",
    "RB",
    "Start",
    "Back",
    "DPadUp",
    "DPadDown",
    "DPadLeft",
    "DPadRight",
    "HB",
];

/// Numbers may arrive as JSON numbers or decimal strings.
pub(crate) fn loose_f32(value: Option<&Value>) -> Option<f32> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

pub(crate) fn loose_f32_or(value: Option<&Value>, default: f32) -> f32 {
    loose_f32(value).unwrap_or(default)
}

pub(crate) fn loose_u32(value: Option<&Value>, default: u32) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|f| f.max(0.0) as u32)
            .unwrap_or(default),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u32)
            .unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn loose_u64(value: Option<&Value>, default: u64) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f.max(0.0) as u64).unwrap_or(default),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u64)
            .unwrap_or(default),
        _ => default,
    }
}

/// Booleans arrive as bools, numbers, or a handful of string spellings.
pub(crate) fn loose_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes" | "down" | "pressed"
        ),
        _ => false,
    }
}

/// Extract a packet from an already-parsed JSON object. Axes are clamped to
/// their declared ranges; missing buttons default to false.
pub(crate) fn packet_from_value(root: &Value, seq: u32) -> InputPacket {
    let axis = root.get("axis");
    let buttons_obj = root.get("buttons");
    let meta_obj = root.get("meta");

    let axis_field = |name: &str| axis.and_then(|a| a.get(name));
    let meta_field = |name: &str| meta_obj.and_then(|m| m.get(name));

    let mut buttons = [false; BUTTON_COUNT];
    for (i, key) in BUTTON_KEYS.iter().enumerate() {
        buttons[i] = loose_bool(buttons_obj.and_then(|b| b.get(*key)));
    }

    InputPacket {
        seq,
        t: loose_u64(root.get("t"), 0),
        steering_x: loose_f32(axis_field("steering_x")).map(|x| x.clamp(-1.0, 1.0)),
        throttle: loose_f32_or(axis_field("throttle"), 0.0).clamp(0.0, 1.0),
        brake: loose_f32_or(axis_field("brake"), 0.0).clamp(0.0, 1.0),
        lat_g: loose_f32_or(axis_field("latG"), 0.0),
        ls_x: loose_f32_or(axis_field("ls_x"), 0.0).clamp(-1.0, 1.0),
        ls_y: loose_f32_or(axis_field("ls_y"), 0.0).clamp(-1.0, 1.0),
        gy: loose_f32(axis_field("gy")),
        gz: loose_f32(axis_field("gz")),
        buttons,
        meta: PacketMeta {
            hello: loose_bool(meta_field("hello")),
            screen_deg: loose_u32(meta_field("screen_deg"), 0),
            tilt_lock_deg: loose_f32(meta_field("tiltLockDeg")).filter(|d| *d > 0.0),
            tilt_dead: loose_f32(meta_field("tiltDead")).map(|d| d.clamp(0.0, 0.3)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_packet_extraction() -> TestResult {
        let root = json!({
            "sig": "WHEEL1",
            "seq": 12,
            "t": 1234,
            "axis": {"steering_x": -0.5, "throttle": 0.75, "brake": 0.0, "latG": 0.8,
                     "ls_x": 0.0, "ls_y": 0.0},
            "buttons": {"A": true, "HB": 1, "DPadLeft": "pressed"},
            "meta": {"hello": true, "screen_deg": 270, "tiltLockDeg": 40.0, "tiltDead": 0.05},
        });
        let p = packet_from_value(&root, 12);
        assert_eq!(p.seq, 12);
        assert_eq!(p.t, 1234);
        assert_eq!(p.steering_x, Some(-0.5));
        assert!((p.throttle - 0.75).abs() < f32::EPSILON);
        assert!(p.button(Button::A));
        assert!(p.button(Button::Hb));
        assert!(p.button(Button::DpadLeft));
        assert!(!p.button(Button::B));
        assert!(p.meta.hello);
        assert_eq!(p.meta.screen_deg, 270);
        assert_eq!(p.meta.tilt_lock_deg, Some(40.0));
        assert_eq!(p.meta.tilt_dead, Some(0.05));
        Ok(())
    }

    #[test]
    fn test_axes_clamped_on_extraction() {
        let root = serde_json::json!({
            "axis": {"steering_x": 4.0, "throttle": -1.0, "brake": 9.0, "ls_x": -8.0}
        });
        let p = packet_from_value(&root, 1);
        assert_eq!(p.steering_x, Some(1.0));
        assert_eq!(p.throttle, 0.0);
        assert_eq!(p.brake, 1.0);
        assert_eq!(p.ls_x, -1.0);
    }

    #[test]
    fn test_missing_sections_default() {
        let root = serde_json::json!({"seq": 3});
        let p = packet_from_value(&root, 3);
        assert_eq!(p.steering_x, None);
        assert_eq!(p.throttle, 0.0);
        assert_eq!(p.button_mask(), 0);
        assert!(!p.meta.hello);
        assert_eq!(p.meta.tilt_lock_deg, None);
    }

    #[test]
    fn test_string_numbers_accepted() {
        let root = serde_json::json!({
            "axis": {"throttle": "0.5", "brake": " 0.25 "}
        });
        let p = packet_from_value(&root, 1);
        assert!((p.throttle - 0.5).abs() < f32::EPSILON);
        assert!((p.brake - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_button_mask_layout() {
        let root = serde_json::json!({
            "buttons": {"A": true, "DPadRight": true, "HB": true}
        });
        let p = packet_from_value(&root, 1);
        assert_eq!(p.button_mask(), 0b1_1000_0000_0001);
    }
}
