//! Force-feedback mixing for the reply path.
//!
//! The mixer owns the arbitration between native FFB reported by the gamepad
//! sidecar and synthetic haptics derived from the audio helper's feature
//! stream, and produces the per-reply [`wheelhost_core::FeedbackState`].

#![deny(static_mut_refs)]

mod envelope;
mod mixer;
mod oscillation;

pub use envelope::ImpactEnvelope;
pub use mixer::FeedbackMixer;
pub use oscillation::OscillationDetector;
