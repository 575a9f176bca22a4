//! ABS/slip oscillation heuristic.
//!
//! Lock-up pulsing shows up in the helper's envelope channels as a fast
//! oscillation around the running mean. The detector counts mean-crossings
//! inside a sliding window; above 6 Hz the corresponding trigger channel is
//! driven with the oscillation amplitude.

use std::collections::VecDeque;

/// Crossings faster than this rate arm the trigger cue.
const GATE_HZ: f32 = 6.0;
/// Sliding window over which crossings are counted.
const WINDOW_MS: u64 = 500;
/// Deviations below this are noise, not oscillation.
const DEVIATION_FLOOR: f32 = 0.02;
/// Smoothing factor for the running mean.
const MEAN_ALPHA: f32 = 0.10;
/// Smoothing factor for the amplitude estimate.
const AMPLITUDE_ALPHA: f32 = 0.20;
/// Amplitude-to-output scale; a 0.25 swing saturates the cue.
const OUTPUT_GAIN: f32 = 4.0;

#[derive(Debug, Default)]
pub struct OscillationDetector {
    mean: f32,
    amplitude: f32,
    last_sign: i8,
    crossings: VecDeque<u64>,
}

impl OscillationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; returns the trigger cue in `[0, 1]` (zero unless the
    /// gate rate is exceeded).
    pub fn update(&mut self, value: f32, now_ms: u64) -> f32 {
        let value = value.clamp(0.0, 1.0);
        self.mean += MEAN_ALPHA * (value - self.mean);
        let deviation = value - self.mean;
        self.amplitude += AMPLITUDE_ALPHA * (deviation.abs() - self.amplitude);

        let sign = if deviation > DEVIATION_FLOOR {
            1
        } else if deviation < -DEVIATION_FLOOR {
            -1
        } else {
            0
        };
        if sign != 0 && self.last_sign != 0 && sign != self.last_sign {
            self.crossings.push_back(now_ms);
        }
        if sign != 0 {
            self.last_sign = sign;
        }

        while let Some(&front) = self.crossings.front() {
            if now_ms.saturating_sub(front) > WINDOW_MS {
                self.crossings.pop_front();
            } else {
                break;
            }
        }

        // Two crossings make one full cycle.
        let rate_hz =
            self.crossings.len() as f32 / 2.0 / (WINDOW_MS as f32 / 1000.0);
        if rate_hz > GATE_HZ {
            (self.amplitude * OUTPUT_GAIN).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        self.mean = 0.0;
        self.amplitude = 0.0;
        self.last_sign = 0;
        self.crossings.clear();
    }
}
