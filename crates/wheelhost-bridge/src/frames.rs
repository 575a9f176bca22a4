//! Sidecar wire frames: state/control lines down, notifications up.

use serde::Serialize;
use serde_json::Value;
use wheelhost_core::{BridgeTarget, GamepadState};

/// Axis deltas below this are noise from the phone's sensor fusion and not
/// worth a pipe write.
pub const AXIS_SEND_EPSILON: f32 = 0.006;

#[derive(Serialize)]
struct StateWire {
    lx: f32,
    ly: f32,
    rt: u8,
    lt: u8,
    buttons: u32,
}

/// One state push line (no trailing newline).
pub fn encode_state(state: &GamepadState) -> String {
    let wire = StateWire {
        lx: state.lx,
        ly: state.ly,
        rt: state.rt,
        lt: state.lt,
        buttons: state.buttons as u32,
    };
    serde_json::to_string(&wire).unwrap_or_default()
}

/// Control line reconfiguring the emulated controller class. `None` for
/// targets that only select at spawn time.
pub fn encode_target(target: BridgeTarget) -> Option<String> {
    if !target.supports_live_retarget() {
        return None;
    }
    Some(format!(
        r#"{{"type":"target","value":"{}"}}"#,
        target.as_str()
    ))
}

/// Whether a new state is worth a write: axes moved past the epsilon, a
/// trigger changed by one LSB, or any button bit flipped.
pub fn state_differs(next: &GamepadState, sent: &GamepadState) -> bool {
    (next.lx - sent.lx).abs() >= AXIS_SEND_EPSILON
        || (next.ly - sent.ly).abs() >= AXIS_SEND_EPSILON
        || next.rt != sent.rt
        || next.lt != sent.lt
        || next.buttons != sent.buttons
}

/// A decoded sidecar stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarMsg {
    Ready,
    Ffb { l: f32, r: f32 },
    /// Helper diagnostics (`info`/`warn`/`error`); logged, not garbage.
    Diagnostic { level: String, note: String },
}

/// Decode one line. `Ok(None)` is a blank line, `Err(())` is garbage that
/// counts toward the restart tolerance.
#[allow(clippy::result_unit_err)]
pub fn parse_sidecar_line(line: &str) -> Result<Option<SidecarMsg>, ()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('{') {
        return Err(());
    }
    let obj: Value = serde_json::from_str(line).map_err(|_| ())?;
    match obj.get("type").and_then(Value::as_str) {
        Some("ready") => Ok(Some(SidecarMsg::Ready)),
        Some("ffb") => {
            let l = obj
                .get("rumbleL")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;
            let r = obj
                .get("rumbleR")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;
            Ok(Some(SidecarMsg::Ffb {
                l: l.clamp(0.0, 1.0),
                r: r.clamp(0.0, 1.0),
            }))
        }
        Some(level @ ("info" | "warn" | "error")) => Ok(Some(SidecarMsg::Diagnostic {
            level: level.to_string(),
            note: obj
                .get("note")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })),
        _ => Err(()),
    }
}
