//! The feedback mixer: one `FeedbackState` per reply, sourced from native
//! FFB, audio-derived synthesis, or the hybrid of both.

use crate::envelope::ImpactEnvelope;
use crate::oscillation::OscillationDetector;
use tracing::debug;
use wheelhost_core::{AudioFeatures, FeedbackState, FfbConfig, FfbMode};

/// Impact jumps smaller than this do not re-arm the burst envelope.
const IMPACT_RISE_THRESHOLD: f32 = 0.15;
/// Minimum spacing between impact bursts.
const IMPACT_REFRACTORY_MS: u64 = 80;
/// Hybrid smoothing factor.
const HYBRID_EMA_ALPHA: f32 = 0.25;
/// Excursion magnitude that arms the re-center detector.
const CENTER_EXCURSION: f32 = 0.5;
/// Steering band counted as centered.
const CENTER_BAND: f32 = 0.02;
/// Dwell inside the band before the center event fires.
const CENTER_DWELL_MS: u64 = 250;

/// Rising-edge detector for the `center` flag.
#[derive(Debug, Default)]
struct CenterDetector {
    pending: bool,
    excursion: bool,
    centered_since: Option<u64>,
}

impl CenterDetector {
    fn on_session_start(&mut self) {
        self.pending = true;
        self.excursion = false;
        self.centered_since = None;
    }

    fn note_steering(&mut self, x: f32, now_ms: u64) {
        if x.abs() > CENTER_EXCURSION {
            self.excursion = true;
            self.centered_since = None;
        } else if self.excursion {
            if x.abs() <= CENTER_BAND {
                self.centered_since.get_or_insert(now_ms);
            } else {
                self.centered_since = None;
            }
        }
    }

    /// Consume the event, if one is due.
    fn take(&mut self, now_ms: u64) -> bool {
        if self.pending {
            self.pending = false;
            return true;
        }
        if self.excursion {
            if let Some(since) = self.centered_since {
                if now_ms.saturating_sub(since) >= CENTER_DWELL_MS {
                    self.excursion = false;
                    self.centered_since = None;
                    return true;
                }
            }
        }
        false
    }
}

/// Owns the feedback half of the session: the last native FFB sample, the
/// audio-derived synthesis state, and the mode arbitration between them.
#[derive(Debug)]
pub struct FeedbackMixer {
    config: FfbConfig,
    /// Most recent native FFB from the sidecar, with its receive time.
    native: Option<(f32, f32, u64)>,
    /// Sidecar respawning: native contribution reads as zero.
    degraded: bool,
    impact: ImpactEnvelope,
    last_impact_feature: f32,
    last_impact_trigger_ms: Option<u64>,
    abs_detector: OscillationDetector,
    slip_detector: OscillationDetector,
    ema_l: f32,
    ema_r: f32,
    center: CenterDetector,
    /// Diagnostic injection deadline, when armed.
    test_until_ms: Option<(f32, f32, u64)>,
}

impl FeedbackMixer {
    pub fn new(config: FfbConfig) -> Self {
        Self {
            config,
            native: None,
            degraded: false,
            impact: ImpactEnvelope::new(),
            last_impact_feature: 0.0,
            last_impact_trigger_ms: None,
            abs_detector: OscillationDetector::new(),
            slip_detector: OscillationDetector::new(),
            ema_l: 0.0,
            ema_r: 0.0,
            center: CenterDetector::default(),
            test_until_ms: None,
        }
    }

    pub fn mode(&self) -> FfbMode {
        self.config.mode
    }

    /// Swap in new feedback options; applies at the next compose.
    pub fn reconfigure(&mut self, config: FfbConfig) {
        if config.mode != self.config.mode {
            debug!(from = %self.config.mode, to = %config.mode, "ffb mode change");
        }
        self.config = config;
    }

    /// Record a native FFB sample reported by the sidecar.
    pub fn on_native_ffb(&mut self, l: f32, r: f32, now_ms: u64) {
        self.native = Some((l.clamp(0.0, 1.0), r.clamp(0.0, 1.0), now_ms));
    }

    /// While degraded, the native contribution is forced to zero.
    pub fn set_degraded(&mut self, degraded: bool) {
        self.degraded = degraded;
    }

    /// Arm the first-reply center event for a fresh session.
    pub fn on_session_start(&mut self) {
        self.center.on_session_start();
        self.ema_l = 0.0;
        self.ema_r = 0.0;
        self.impact.reset();
        self.abs_detector.reset();
        self.slip_detector.reset();
    }

    /// Track shaped steering for the re-center detector.
    pub fn note_steering(&mut self, x: f32, now_ms: u64) {
        self.center.note_steering(x, now_ms);
    }

    /// Inject a fixed native-equivalent rumble for `duration_ms`; keeps its
    /// freshness refreshed so passthrough renders it. Diagnostics only.
    pub fn inject_test(&mut self, l: f32, r: f32, duration_ms: u64, now_ms: u64) {
        self.test_until_ms = Some((
            l.clamp(0.0, 1.0),
            r.clamp(0.0, 1.0),
            now_ms + duration_ms,
        ));
        debug!(l = l as f64, r = r as f64, duration_ms, "ffb test injection armed");
    }

    fn passthrough(&self, now_ms: u64) -> (f32, f32) {
        if self.degraded {
            return (0.0, 0.0);
        }
        match self.native {
            Some((l, r, at)) if now_ms.saturating_sub(at) <= self.config.stale_ms => (l, r),
            _ => (0.0, 0.0),
        }
    }

    fn synthetic(&mut self, features: &AudioFeatures, now_ms: u64) -> (f32, f32, f32, f32, f32) {
        let l = (features.body_l * self.config.gain_l).clamp(0.0, 1.0);
        let r = (features.body_r * self.config.gain_r).clamp(0.0, 1.0);

        // Impact is edge-triggered with a refractory so one hit maps to one
        // burst rather than a plateau.
        let rise = features.impact - self.last_impact_feature;
        let refractory_clear = self
            .last_impact_trigger_ms
            .map_or(true, |at| now_ms.saturating_sub(at) >= IMPACT_REFRACTORY_MS);
        if rise > IMPACT_RISE_THRESHOLD && refractory_clear {
            self.impact.trigger(features.impact, now_ms);
            self.last_impact_trigger_ms = Some(now_ms);
        }
        self.last_impact_feature = features.impact;

        let trig_l = self.abs_detector.update(features.engine, now_ms);
        let trig_r = self.slip_detector.update(features.body_r, now_ms);

        (l, r, trig_l, trig_r, self.impact.sample(now_ms))
    }

    /// Compose the reply state for this tick.
    pub fn compose(
        &mut self,
        features: &AudioFeatures,
        ack: u32,
        now_ms: u64,
    ) -> FeedbackState {
        if let Some((l, r, until)) = self.test_until_ms {
            if now_ms < until {
                self.native = Some((l, r, now_ms));
            } else {
                self.test_until_ms = None;
            }
        }

        let (rumble_l, rumble_r, trig_l, trig_r, impact) = match self.config.mode {
            FfbMode::Passthrough => {
                let (l, r) = self.passthrough(now_ms);
                (l, r, 0.0, 0.0, 0.0)
            }
            FfbMode::Synthetic => {
                let (l, r, tl, tr, imp) = self.synthetic(features, now_ms);
                (l, r, tl, tr, imp)
            }
            FfbMode::Hybrid => {
                let (p_l, p_r) = self.passthrough(now_ms);
                let (s_l, s_r, tl, tr, imp) = self.synthetic(features, now_ms);
                let target_l = p_l.max(s_l);
                let target_r = p_r.max(s_r);
                self.ema_l += HYBRID_EMA_ALPHA * (target_l - self.ema_l);
                self.ema_r += HYBRID_EMA_ALPHA * (target_r - self.ema_r);
                (self.ema_l, self.ema_r, tl, tr, imp)
            }
        };

        FeedbackState {
            rumble_l,
            rumble_r,
            trig_l,
            trig_r,
            impact,
            center: self.center.take(now_ms),
            ack,
        }
        .clamped()
    }

    /// Source label for diagnostics: which path is currently feeding rumble.
    pub fn source_label(&self, now_ms: u64) -> &'static str {
        let native_fresh = !self.degraded
            && matches!(self.native, Some((_, _, at)) if now_ms.saturating_sub(at) <= self.config.stale_ms);
        match (self.config.mode, native_fresh) {
            (FfbMode::Passthrough, true) => "real",
            (FfbMode::Passthrough, false) => "none",
            (FfbMode::Synthetic, _) => "audio",
            (FfbMode::Hybrid, true) => "real+audio",
            (FfbMode::Hybrid, false) => "audio",
        }
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn composed_state_always_in_range(
            body_l in 0.0f32..=1.5,
            body_r in 0.0f32..=1.5,
            impact in 0.0f32..=1.5,
            native_l in -0.5f32..=1.5,
            native_r in -0.5f32..=1.5,
            mode_idx in 0usize..3,
        ) {
            let mode = [FfbMode::Passthrough, FfbMode::Synthetic, FfbMode::Hybrid][mode_idx];
            let mut mixer = FeedbackMixer::new(FfbConfig { mode, ..Default::default() });
            mixer.on_native_ffb(native_l, native_r, 0);
            let features = AudioFeatures {
                body_l, body_r, impact, ..Default::default()
            }.clamped();
            for tick in 0..5u64 {
                let state = mixer.compose(&features, tick as u32, tick * 16);
                prop_assert!((0.0..=1.0).contains(&state.rumble_l));
                prop_assert!((0.0..=1.0).contains(&state.rumble_r));
                prop_assert!((0.0..=1.0).contains(&state.trig_l));
                prop_assert!((0.0..=1.0).contains(&state.trig_r));
                prop_assert!((0.0..=1.0).contains(&state.impact));
            }
        }
    }
}
