//! Steering shaping: tilt fallback, symmetric deadzone, expo curve.

/// Session-scoped steering tuning.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SteeringTuning {
    /// Expo blend strength in `[0, 1]`; 0 is linear.
    pub expo: f32,
    /// Symmetric deadzone half-width; inputs below it read as zero.
    pub deadzone: f32,
}

impl Default for SteeringTuning {
    fn default() -> Self {
        Self {
            expo: 0.22,
            deadzone: 0.06,
        }
    }
}

/// Full-lock fallback when the phone sends no lock angle of its own.
const DEFAULT_TILT_LOCK_DEG: f32 = 40.0;

/// Host-side steering from raw gravity components, used when the phone did
/// not pre-normalize. `screen_deg == 270` flips the tilt parity (the phone
/// is held rotated the other way around).
pub fn steering_from_tilt(
    gy: f32,
    gz: f32,
    tilt_lock_deg: Option<f32>,
    screen_deg: u32,
) -> f32 {
    let lock = tilt_lock_deg.unwrap_or(DEFAULT_TILT_LOCK_DEG).max(1.0);
    let theta_deg = gy.atan2(gz).to_degrees();
    let parity = if screen_deg == 270 { -1.0 } else { 1.0 };
    (parity * theta_deg / lock).clamp(-1.0, 1.0)
}

/// Shape a lock-normalized steering value: deadzone with rescale, then the
/// expo blend `x' = (1-e)*x + e*x^3`, then clamp. Odd-symmetric by
/// construction and exact at the endpoints (`±1 → ±1`, `±deadzone → 0`).
pub fn shape_steering(x: f32, tuning: &SteeringTuning) -> f32 {
    let dz = tuning.deadzone.clamp(0.0, 0.3);
    let x = x.clamp(-1.0, 1.0);

    let magnitude = x.abs();
    if magnitude < dz || magnitude == 0.0 {
        return 0.0;
    }
    let sign = x.signum();
    // Rescale so the active band spans the full output range again.
    let scaled = if dz > 0.0 && dz < 1.0 {
        (magnitude - dz) / (1.0 - dz)
    } else {
        magnitude
    };

    let e = tuning.expo.clamp(0.0, 1.0);
    let curved = (1.0 - e) * scaled + e * scaled * scaled * scaled;
    (sign * curved).clamp(-1.0, 1.0)
}
