//! Host configuration: one in-memory struct, loaded from a JSON document,
//! mutable only through explicit reconfigure calls. Invalid configuration is
//! fatal at startup.

use crate::error::ConfigError;
use crate::state::{BridgeTarget, FfbMode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default UDP listen port for the phone flow.
pub const DEFAULT_UDP_PORT: u16 = 8765;

/// UDP endpoint options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Listen port, bound on all interfaces.
    pub port: u16,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_UDP_PORT,
        }
    }
}

/// Force-feedback reply options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfbConfig {
    pub mode: FfbMode,
    /// Native FFB older than this reads as zero in passthrough.
    pub stale_ms: u64,
    pub gain_l: f32,
    pub gain_r: f32,
}

impl Default for FfbConfig {
    fn default() -> Self {
        Self {
            mode: FfbMode::Hybrid,
            stale_ms: 500,
            gain_l: 1.0,
            gain_r: 1.0,
        }
    }
}

/// Gamepad sidecar options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub target: BridgeTarget,
    /// Explicit sidecar executable; empty selects the per-target default.
    pub exe: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            target: BridgeTarget::platform_default(),
            exe: String::new(),
        }
    }
}

/// Audio helper options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Helper executable path; empty disables audio-derived haptics.
    pub helper: String,
}

/// Complete host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub udp: UdpConfig,
    /// Session declared dead after this much datagram silence.
    pub idle_timeout_ms: u64,
    /// Session loop cadence.
    pub tick_hz: u32,
    /// Max silence toward the sidecar before a keepalive state line.
    pub keepalive_ms: u64,
    /// Button release holdoff in ticks.
    pub latch_ticks: u32,
    /// Steering expo curve strength in `[0, 1]`.
    pub expo: f32,
    /// Steering deadzone in `[0, 0.3]`, used when the phone sends none.
    pub deadzone: f32,
    pub ffb: FfbConfig,
    pub bridge: BridgeConfig,
    pub audio: AudioConfig,
    /// After an idle teardown, foreign peers stay rejected this long.
    pub peer_grace_ms: u64,
    /// Sidecar respawn attempts before the backoff ceiling is fatal.
    pub spawn_max_attempts: u32,
    /// tracing env-filter directive for the daemon.
    pub log_filter: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            udp: UdpConfig::default(),
            idle_timeout_ms: 3000,
            tick_hz: 60,
            keepalive_ms: 90,
            latch_ticks: 3,
            expo: 0.22,
            deadzone: 0.06,
            ffb: FfbConfig::default(),
            bridge: BridgeConfig::default(),
            audio: AudioConfig::default(),
            peer_grace_ms: 1500,
            spawn_max_attempts: 8,
            log_filter: "wheelhost=debug,info".to_string(),
        }
    }
}

impl HostConfig {
    /// Tick period derived from `tick_hz`. Valid configs keep this >= 1 ms.
    pub fn tick_period_ms(&self) -> u64 {
        (1000 / self.tick_hz.max(1) as u64).max(1)
    }

    /// Reject values that would wedge the session loop or produce
    /// out-of-range outputs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.udp.port == 0 {
            return Err(ConfigError::OutOfRange {
                field: "udp.port",
                value: "0".into(),
                expected: "1..=65535",
            });
        }
        if self.tick_hz == 0 || self.tick_hz > 1000 {
            return Err(ConfigError::OutOfRange {
                field: "tick_hz",
                value: self.tick_hz.to_string(),
                expected: "1..=1000",
            });
        }
        if !(0.0..=1.0).contains(&self.expo) {
            return Err(ConfigError::OutOfRange {
                field: "expo",
                value: self.expo.to_string(),
                expected: "0.0..=1.0",
            });
        }
        if !(0.0..=0.3).contains(&self.deadzone) {
            return Err(ConfigError::OutOfRange {
                field: "deadzone",
                value: self.deadzone.to_string(),
                expected: "0.0..=0.3",
            });
        }
        if self.ffb.gain_l < 0.0 || self.ffb.gain_r < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "ffb.gain",
                value: format!("{}/{}", self.ffb.gain_l, self.ffb.gain_r),
                expected: ">= 0.0",
            });
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "idle_timeout_ms",
                value: "0".into(),
                expected: ">= 1",
            });
        }
        if self.spawn_max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "spawn_max_attempts",
                value: "0".into(),
                expected: ">= 1",
            });
        }
        Ok(())
    }

    /// Load from `path`, creating it with defaults when absent.
    pub async fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: HostConfig = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            debug!("loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path).await?;
            info!("created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Persist to `path`, creating parent directories as needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize config")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Default config file location under the user config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("LOCALAPPDATA").context("LOCALAPPDATA not set")?
        } else {
            format!(
                "{}/.config",
                std::env::var("HOME").context("HOME not set")?
            )
        };
        Ok(PathBuf::from(config_dir)
            .join("wheelhost")
            .join("host.json"))
    }
}
