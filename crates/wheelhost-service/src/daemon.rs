//! Daemon lifecycle: component wiring, signal handling, exit codes.

use crate::endpoint::UdpEndpoint;
use crate::session_loop::SessionLoop;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use wheelhost_audio::AudioIngestor;
use wheelhost_bridge::{BridgeSupervisor, SupervisorConfig, SupervisorError};
use wheelhost_core::{ExitCode, HostConfig, MonotonicClock};

/// Owns one run of the host: bind, wire, loop, unwind.
pub struct Daemon {
    config: HostConfig,
}

impl Daemon {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// Run to completion and report the process exit code. Configuration is
    /// validated by the caller before this point.
    pub async fn run(self) -> ExitCode {
        let clock = Arc::new(MonotonicClock::new());

        let bind_addr =
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.config.udp.port));
        let endpoint = match UdpEndpoint::bind(bind_addr).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("{e}");
                return ExitCode::UdpBindFailure;
            }
        };

        let supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                target: self.config.bridge.target,
                exe: self.config.bridge.exe.clone(),
                keepalive_ms: self.config.keepalive_ms,
                max_attempts: self.config.spawn_max_attempts,
            },
            clock.clone(),
        );

        let audio = if self.config.audio.helper.is_empty() {
            info!("audio helper disabled, synthetic haptics read zero");
            AudioIngestor::disabled()
        } else {
            match AudioIngestor::spawn(Path::new(&self.config.audio.helper)) {
                Ok(ingestor) => ingestor,
                Err(e) => {
                    warn!("{e}; continuing without audio haptics");
                    AudioIngestor::disabled()
                }
            }
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            let _ = shutdown_tx.send(());
        });

        let mut session_loop =
            SessionLoop::new(self.config, clock, endpoint, supervisor, audio);
        match session_loop.run(shutdown_rx).await {
            Ok(()) => {
                info!("wheelhost stopped");
                ExitCode::Ok
            }
            Err(e @ SupervisorError::BackoffCeiling { .. }) => {
                error!("{e}");
                ExitCode::SidecarUnavailable
            }
        }
    }
}

/// Block until the platform asks us to stop.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to register SIGTERM handler: {e}");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to register SIGINT handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("error waiting for Ctrl+C: {e}");
            return;
        }
        info!("received Ctrl+C");
    }
}
