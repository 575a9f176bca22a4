//! Core types shared across the wheelhost workspace.
//!
//! This crate consolidates the pieces every other crate leans on:
//!
//! - `clock` - monotonic millisecond clock, injectable for deterministic tests
//! - `state` - normalized gamepad/feedback/audio data model and button layout
//! - `config` - the single host configuration struct with load/save/validate
//! - `error` - typed error taxonomy and process exit codes
//! - `stats` - drop/accept counters for the soft-real-time paths

#![deny(static_mut_refs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod state;
pub mod stats;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    AudioConfig, BridgeConfig, FfbConfig, HostConfig, UdpConfig, DEFAULT_UDP_PORT,
};
pub use error::{ConfigError, ExitCode};
pub use state::{
    AudioFeatures, BridgeTarget, Button, FeedbackState, FfbMode, GamepadState, BUTTON_COUNT,
};
pub use stats::SessionStats;
