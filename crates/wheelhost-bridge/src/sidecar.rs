//! Sidecar process selection.
//!
//! Exactly three sidecar variants exist, one per [`BridgeTarget`]: the
//! XInput-class and DualShock-class pads share the ViGEm helper binary and
//! differ only by a control line; the DriverKit bridge is its own helper and
//! selects at spawn. All three speak the same stdin/stdout contract.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use wheelhost_core::BridgeTarget;

/// Helper binary looked up on PATH when no explicit override is configured.
pub fn default_exe_name(target: BridgeTarget) -> &'static str {
    match target {
        BridgeTarget::X360 | BridgeTarget::Ds4 => "vigem-bridge",
        BridgeTarget::DkBridge => "dk-bridge",
    }
}

/// Build the child command for a target. `exe_override` empty means the
/// per-target default.
pub fn sidecar_command(target: BridgeTarget, exe_override: &str) -> Command {
    let exe: &Path = if exe_override.is_empty() {
        Path::new(default_exe_name(target))
    } else {
        Path::new(exe_override)
    };
    let mut command = Command::new(exe);
    if target == BridgeTarget::DkBridge {
        // The DriverKit helper takes its class at spawn time.
        command.arg("--target").arg(target.as_str());
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    command
}
