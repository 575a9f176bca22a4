//! Telemetry-to-controller translation.
//!
//! Turns the most recent phone packet into a normalized [`GamepadState`]:
//! steering through the deadzone/expo pipeline (with host-side tilt as a
//! fallback), throttle/brake onto the triggers, D-pad onto the left stick,
//! and all thirteen buttons through the release latch.
//!
//! Packets and ticks are decoupled: [`InputTranslator::ingest`] absorbs each
//! accepted packet (the phone may send faster than the loop runs), while
//! [`InputTranslator::tick_state`] advances the latch exactly once per loop
//! tick and yields the state staged for the sidecar.

#![deny(static_mut_refs)]

mod latch;
mod steering;

pub use latch::ButtonLatch;
pub use steering::{shape_steering, steering_from_tilt, SteeringTuning};

use wheelhost_core::{Button, GamepadState, BUTTON_COUNT};
use wheelhost_protocol::InputPacket;

/// Translator configuration, a narrow slice of the host config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslatorConfig {
    pub expo: f32,
    pub deadzone: f32,
    pub latch_ticks: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            expo: 0.22,
            deadzone: 0.06,
            latch_ticks: 3,
        }
    }
}

/// Stateful translator; one per session loop.
#[derive(Debug)]
pub struct InputTranslator {
    config: TranslatorConfig,
    latch: ButtonLatch,
    /// Button states as last reported by the phone.
    sources: [bool; BUTTON_COUNT],
    /// Axes computed from the last ingested packet.
    lx: f32,
    ly: f32,
    rt: u8,
    lt: u8,
    /// Last shaped steering value, exposed for the center detector.
    last_steering: f32,
}

impl InputTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self {
            config,
            latch: ButtonLatch::new(config.latch_ticks),
            sources: [false; BUTTON_COUNT],
            lx: 0.0,
            ly: 0.0,
            rt: 0,
            lt: 0,
            last_steering: 0.0,
        }
    }

    /// Apply new tuning; takes effect on the next packet.
    pub fn reconfigure(&mut self, config: TranslatorConfig) {
        self.config = config;
        self.latch.set_latch_ticks(config.latch_ticks);
    }

    /// Shaped steering from the most recent packet.
    pub fn last_steering(&self) -> f32 {
        self.last_steering
    }

    /// Absorb one accepted packet: recompute the axes and remember the
    /// button sources. The latch is untouched until the next tick.
    pub fn ingest(&mut self, packet: &InputPacket) {
        let tuning = SteeringTuning {
            expo: self.config.expo,
            // The phone's requested deadzone wins over the host default.
            deadzone: packet.meta.tilt_dead.unwrap_or(self.config.deadzone),
        };

        let raw_steering = match packet.steering_x {
            Some(x) => x,
            None => match (packet.gy, packet.gz) {
                (Some(gy), Some(gz)) => steering_from_tilt(
                    gy,
                    gz,
                    packet.meta.tilt_lock_deg,
                    packet.meta.screen_deg,
                ),
                _ => 0.0,
            },
        };
        let steering = shape_steering(raw_steering, &tuning);
        self.last_steering = steering;

        // D-pad beats the packet stick, the packet stick beats steering on
        // the x axis; "beats" means the non-zero source wins.
        let dpad_x = dpad_axis(packet.button(Button::DpadRight), packet.button(Button::DpadLeft));
        let dpad_y = dpad_axis(packet.button(Button::DpadDown), packet.button(Button::DpadUp));
        let stick_x = non_zero_or(dpad_x, packet.ls_x);
        let stick_y = non_zero_or(dpad_y, packet.ls_y);

        self.lx = non_zero_or(stick_x, steering).clamp(-1.0, 1.0);
        self.ly = stick_y.clamp(-1.0, 1.0);
        self.rt = trigger_u8(packet.throttle);
        self.lt = trigger_u8(packet.brake);
        self.sources = packet.buttons;
    }

    /// Advance the latch one tick and return the state to stage. Call
    /// exactly once per loop tick while a session is live.
    pub fn tick_state(&mut self) -> GamepadState {
        let buttons = self.latch.tick(&self.sources);
        GamepadState {
            lx: self.lx,
            ly: self.ly,
            rt: self.rt,
            lt: self.lt,
            buttons,
        }
    }

    /// Forget all transient state (session teardown, background freeze).
    pub fn reset(&mut self) {
        self.latch.reset();
        self.sources = [false; BUTTON_COUNT];
        self.lx = 0.0;
        self.ly = 0.0;
        self.rt = 0;
        self.lt = 0;
        self.last_steering = 0.0;
    }
}

fn dpad_axis(positive: bool, negative: bool) -> f32 {
    (positive as i8 - negative as i8) as f32
}

fn non_zero_or(preferred: f32, fallback: f32) -> f32 {
    if preferred != 0.0 {
        preferred
    } else {
        fallback
    }
}

fn trigger_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheelhost_protocol::PacketMeta;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn packet(seq: u32) -> InputPacket {
        InputPacket {
            seq,
            t: 0,
            steering_x: Some(0.0),
            throttle: 0.0,
            brake: 0.0,
            lat_g: 0.0,
            ls_x: 0.0,
            ls_y: 0.0,
            gy: None,
            gz: None,
            buttons: [false; BUTTON_COUNT],
            meta: PacketMeta::default(),
        }
    }

    fn translate_once(tr: &mut InputTranslator, p: &InputPacket) -> GamepadState {
        tr.ingest(p);
        tr.tick_state()
    }

    #[test]
    fn test_trigger_endpoints() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.throttle = 1.0;
        p.brake = 0.0;
        let state = translate_once(&mut tr, &p);
        assert_eq!(state.rt, 255);
        assert_eq!(state.lt, 0);
        Ok(())
    }

    #[test]
    fn test_trigger_rounding() {
        assert_eq!(trigger_u8(0.5), 128);
        assert_eq!(trigger_u8(0.999), 255);
        assert_eq!(trigger_u8(-0.5), 0);
    }

    #[test]
    fn test_steering_within_deadzone_is_zero() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = Some(0.05);
        assert_eq!(translate_once(&mut tr, &p).lx, 0.0);
        Ok(())
    }

    #[test]
    fn test_full_lock_steering_exact() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = Some(1.0);
        assert_eq!(translate_once(&mut tr, &p).lx, 1.0);
        p.seq = 2;
        p.steering_x = Some(-1.0);
        assert_eq!(translate_once(&mut tr, &p).lx, -1.0);
        Ok(())
    }

    #[test]
    fn test_phone_deadzone_overrides_host() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = Some(0.1);
        p.meta.tilt_dead = Some(0.2);
        assert_eq!(translate_once(&mut tr, &p).lx, 0.0);
        Ok(())
    }

    #[test]
    fn test_tilt_fallback_when_steering_absent() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = None;
        p.gy = Some(1.0);
        p.gz = Some(1.0);
        p.meta.tilt_lock_deg = Some(40.0);
        // 45 degrees against a 40-degree lock saturates positive.
        assert_eq!(translate_once(&mut tr, &p).lx, 1.0);
        Ok(())
    }

    #[test]
    fn test_dpad_drives_left_stick() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.buttons[Button::DpadLeft.index()] = true;
        p.buttons[Button::DpadUp.index()] = true;
        let state = translate_once(&mut tr, &p);
        assert_eq!(state.lx, -1.0);
        assert_eq!(state.ly, -1.0);
        // The D-pad bits still land in the mask alongside the axis mapping.
        assert!(state.button(Button::DpadLeft));
        assert!(state.button(Button::DpadUp));
        Ok(())
    }

    #[test]
    fn test_dpad_overrides_steering() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = Some(0.9);
        p.buttons[Button::DpadRight.index()] = true;
        assert_eq!(translate_once(&mut tr, &p).lx, 1.0);
        Ok(())
    }

    #[test]
    fn test_packet_stick_wins_over_steering() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.steering_x = Some(0.9);
        p.ls_x = -0.5;
        assert_eq!(translate_once(&mut tr, &p).lx, -0.5);
        Ok(())
    }

    #[test]
    fn test_button_latch_across_ticks() -> TestResult {
        // Press in the first packet, release in the second: the latch keeps
        // the bit through tick 3, and tick 4 reads clear.
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.buttons[Button::A.index()] = true;
        tr.ingest(&p);
        assert_eq!(tr.tick_state().buttons, 1); // tick 1

        let mut released = packet(2);
        released.buttons[Button::A.index()] = false;
        tr.ingest(&released);
        assert_eq!(tr.tick_state().buttons, 1); // tick 2
        assert_eq!(tr.tick_state().buttons, 1); // tick 3
        assert_eq!(tr.tick_state().buttons, 0); // tick 4
        Ok(())
    }

    #[test]
    fn test_latch_holds_without_fresh_packets() -> TestResult {
        // A dropped datagram between ticks must not read as a release; the
        // last reported hold keeps refreshing the latch.
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.buttons[Button::Rb.index()] = true;
        tr.ingest(&p);
        for _ in 0..10 {
            assert_ne!(tr.tick_state().buttons & Button::Rb.bit(), 0);
        }
        Ok(())
    }

    #[test]
    fn test_hb_maps_to_bit_twelve() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.buttons[Button::Hb.index()] = true;
        let state = translate_once(&mut tr, &p);
        assert_eq!(state.buttons, 1 << 12);
        // Handbrake never bleeds into the triggers.
        assert_eq!(state.lt, 0);
        Ok(())
    }

    #[test]
    fn test_reset_clears_everything() -> TestResult {
        let mut tr = InputTranslator::new(TranslatorConfig::default());
        let mut p = packet(1);
        p.throttle = 1.0;
        p.buttons[Button::B.index()] = true;
        let _ = translate_once(&mut tr, &p);
        tr.reset();
        let state = tr.tick_state();
        assert!(state.is_neutral());
        Ok(())
    }
}
