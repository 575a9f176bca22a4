//! Tolerant parsing of the helper's stdout lines.

use serde_json::Value;
use wheelhost_core::AudioFeatures;

/// One decoded helper line.
#[derive(Debug, Clone, PartialEq)]
pub enum HelperMsg {
    /// Helper is capturing; the ingestor arms.
    Started { device: String },
    /// A feature update. Only sent while armed.
    Features(AudioFeatures),
    /// Helper stopped or errored; the ingestor disarms.
    Stopped,
}

fn field_f32(obj: &Value, key: &str) -> f32 {
    obj.get(key)
        .and_then(Value::as_f64)
        .map(|f| f as f32)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

/// Decode one line. `None` means the line is not part of the protocol
/// (malformed JSON, plain-text diagnostics) and should be skipped.
pub fn parse_helper_line(line: &str) -> Option<HelperMsg> {
    let line = line.trim();
    if line.is_empty() || !line.starts_with('{') {
        return None;
    }
    let obj: Value = serde_json::from_str(line).ok()?;

    if let Some(status) = obj.get("status").and_then(Value::as_str) {
        return match status {
            "started" => Some(HelperMsg::Started {
                device: obj
                    .get("device")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "stopped" | "error" => Some(HelperMsg::Stopped),
            _ => None,
        };
    }

    // Feature lines are recognized by the body channels being present.
    if obj.get("bodyL").is_some() && obj.get("bodyR").is_some() {
        return Some(HelperMsg::Features(AudioFeatures {
            body_l: field_f32(&obj, "bodyL"),
            body_r: field_f32(&obj, "bodyR"),
            impact: field_f32(&obj, "impact"),
            engine: field_f32(&obj, "engine"),
            road: field_f32(&obj, "road"),
            device: obj
                .get("device")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }));
    }

    None
}
