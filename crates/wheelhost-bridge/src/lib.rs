//! Gamepad sidecar supervision.
//!
//! The sidecar is an external process that owns the platform's virtual
//! gamepad surface (ViGEm on Windows, a DriverKit helper on macOS, uinput on
//! Linux). The host talks to it over line-delimited JSON on stdin/stdout:
//! state pushes down, `ready`/`ffb` notifications up. The supervisor keeps
//! exactly one child alive, restarts it with exponential backoff, and turns
//! its stdout into typed events consumed by the session loop; no callbacks
//! reach back into the loop's state.

#![deny(static_mut_refs)]

mod events;
mod frames;
mod sidecar;
mod supervisor;

pub use events::{BridgeEvent, EventQueue, EVENT_QUEUE_CAPACITY};
pub use frames::{encode_state, encode_target, parse_sidecar_line, state_differs, SidecarMsg};
pub use sidecar::{default_exe_name, sidecar_command};
pub use supervisor::{
    backoff_delay_ms, BridgeSupervisor, SupervisorConfig, SupervisorError, RESPAWN_QUEUE_MS,
};
