//! Normalized data model: gamepad state, feedback state, audio features,
//! button layout, and the sidecar/FFB mode enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of logical buttons carried by the phone protocol.
pub const BUTTON_COUNT: usize = 13;

/// Logical buttons in bitmask order. `HB` (handbrake) sits above the D-pad
/// block at bit 12 and is reported as a plain button, never as a trigger
/// stretch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    Lb = 4,
    Rb = 5,
    Start = 6,
    Back = 7,
    DpadUp = 8,
    DpadDown = 9,
    DpadLeft = 10,
    DpadRight = 11,
    Hb = 12,
}

impl Button {
    /// All buttons in bit order.
    pub const ALL: [Button; BUTTON_COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Lb,
        Button::Rb,
        Button::Start,
        Button::Back,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
        Button::Hb,
    ];

    pub fn bit(self) -> u16 {
        1u16 << (self as u16)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Normalized controller state pushed to the sidecar.
///
/// `lx`/`ly` are stick axes in `[-1, 1]`, `rt`/`lt` trigger values in
/// `[0, 255]`, `buttons` the 16-bit mask laid out per [`Button`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GamepadState {
    pub lx: f32,
    pub ly: f32,
    pub rt: u8,
    pub lt: u8,
    pub buttons: u16,
}

impl GamepadState {
    /// Everything centered, released, and unpressed.
    pub const NEUTRAL: GamepadState = GamepadState {
        lx: 0.0,
        ly: 0.0,
        rt: 0,
        lt: 0,
        buttons: 0,
    };

    /// Clamp all fields into their declared ranges.
    pub fn clamped(mut self) -> Self {
        self.lx = self.lx.clamp(-1.0, 1.0);
        self.ly = self.ly.clamp(-1.0, 1.0);
        self
    }

    pub fn is_neutral(&self) -> bool {
        self.lx == 0.0 && self.ly == 0.0 && self.rt == 0 && self.lt == 0 && self.buttons == 0
    }

    pub fn button(&self, b: Button) -> bool {
        self.buttons & b.bit() != 0
    }
}

impl Default for GamepadState {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Feedback returned to the phone on the UDP flow.
///
/// `rumble_l`/`rumble_r` carry either native game FFB or audio-derived
/// synthesis depending on the active [`FfbMode`]. `center` is a rising-edge
/// event, not a level.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedbackState {
    pub rumble_l: f32,
    pub rumble_r: f32,
    pub trig_l: f32,
    pub trig_r: f32,
    pub impact: f32,
    pub center: bool,
    pub ack: u32,
}

impl FeedbackState {
    pub fn clamped(mut self) -> Self {
        self.rumble_l = self.rumble_l.clamp(0.0, 1.0);
        self.rumble_r = self.rumble_r.clamp(0.0, 1.0);
        self.trig_l = self.trig_l.clamp(0.0, 1.0);
        self.trig_r = self.trig_r.clamp(0.0, 1.0);
        self.impact = self.impact.clamp(0.0, 1.0);
        self
    }
}

/// Latest envelope features reported by the audio helper. All channels are
/// helper-computed; the host does no DSP of its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub body_l: f32,
    pub body_r: f32,
    pub impact: f32,
    pub engine: f32,
    pub road: f32,
    pub device: String,
}

impl AudioFeatures {
    pub fn clamped(mut self) -> Self {
        self.body_l = self.body_l.clamp(0.0, 1.0);
        self.body_r = self.body_r.clamp(0.0, 1.0);
        self.impact = self.impact.clamp(0.0, 1.0);
        self.engine = self.engine.clamp(0.0, 1.0);
        self.road = self.road.clamp(0.0, 1.0);
        self
    }

    pub fn is_silent(&self) -> bool {
        self.body_l == 0.0
            && self.body_r == 0.0
            && self.impact == 0.0
            && self.engine == 0.0
            && self.road == 0.0
    }
}

/// Emulated controller class owned by the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeTarget {
    #[default]
    X360,
    Ds4,
    DkBridge,
}

impl BridgeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeTarget::X360 => "x360",
            BridgeTarget::Ds4 => "ds4",
            BridgeTarget::DkBridge => "dkbridge",
        }
    }

    /// Platform-appropriate default: the DriverKit bridge on macOS, the
    /// XInput-class pad elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            BridgeTarget::DkBridge
        } else {
            BridgeTarget::X360
        }
    }

    /// Whether the sidecar accepts a live `target` control line instead of
    /// requiring a restart.
    pub fn supports_live_retarget(&self) -> bool {
        matches!(self, BridgeTarget::X360 | BridgeTarget::Ds4)
    }
}

impl fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x360" => Ok(BridgeTarget::X360),
            "ds4" => Ok(BridgeTarget::Ds4),
            "dkbridge" => Ok(BridgeTarget::DkBridge),
            other => Err(format!("unknown bridge target: {other}")),
        }
    }
}

/// How phone-bound rumble is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FfbMode {
    /// Only native FFB reported by the sidecar; zero when stale.
    Passthrough,
    /// Only audio-derived synthesis.
    Synthetic,
    /// Per-channel max of both, smoothed.
    #[default]
    Hybrid,
}

impl fmt::Display for FfbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FfbMode::Passthrough => "passthrough",
            FfbMode::Synthetic => "synthetic",
            FfbMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

impl FromStr for FfbMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(FfbMode::Passthrough),
            "synthetic" => Ok(FfbMode::Synthetic),
            "hybrid" => Ok(FfbMode::Hybrid),
            other => Err(format!("unknown ffb mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_button_bits_are_disjoint() -> TestResult {
        let mut seen = 0u16;
        for b in Button::ALL {
            assert_eq!(seen & b.bit(), 0, "overlapping bit for {b:?}");
            seen |= b.bit();
        }
        assert_eq!(seen, 0x1FFF);
        Ok(())
    }

    #[test]
    fn test_hb_is_bit_twelve() {
        assert_eq!(Button::Hb.bit(), 1 << 12);
        assert_eq!(Button::DpadRight.bit(), 1 << 11);
    }

    #[test]
    fn test_neutral_state() {
        assert!(GamepadState::NEUTRAL.is_neutral());
        let mut s = GamepadState::NEUTRAL;
        s.rt = 1;
        assert!(!s.is_neutral());
    }

    #[test]
    fn test_gamepad_clamp() {
        let s = GamepadState {
            lx: 1.7,
            ly: -3.0,
            rt: 255,
            lt: 0,
            buttons: 0,
        }
        .clamped();
        assert_eq!(s.lx, 1.0);
        assert_eq!(s.ly, -1.0);
    }

    #[test]
    fn test_feedback_clamp() {
        let f = FeedbackState {
            rumble_l: 1.5,
            rumble_r: -0.2,
            trig_l: 0.5,
            trig_r: 0.0,
            impact: 2.0,
            center: false,
            ack: 7,
        }
        .clamped();
        assert_eq!(f.rumble_l, 1.0);
        assert_eq!(f.rumble_r, 0.0);
        assert_eq!(f.impact, 1.0);
        assert_eq!(f.ack, 7);
    }

    #[test]
    fn test_bridge_target_round_trip() -> TestResult {
        for t in [BridgeTarget::X360, BridgeTarget::Ds4, BridgeTarget::DkBridge] {
            assert_eq!(t.as_str().parse::<BridgeTarget>().ok(), Some(t));
        }
        assert!("joystick".parse::<BridgeTarget>().is_err());
        Ok(())
    }

    #[test]
    fn test_ffb_mode_parse() -> TestResult {
        assert_eq!("HYBRID".parse::<FfbMode>().ok(), Some(FfbMode::Hybrid));
        assert_eq!(
            " passthrough ".parse::<FfbMode>().ok(),
            Some(FfbMode::Passthrough)
        );
        assert!("bed".parse::<FfbMode>().is_err());
        Ok(())
    }

    #[test]
    fn test_dkbridge_requires_restart_on_retarget() {
        assert!(BridgeTarget::X360.supports_live_retarget());
        assert!(BridgeTarget::Ds4.supports_live_retarget());
        assert!(!BridgeTarget::DkBridge.supports_live_retarget());
    }
}
