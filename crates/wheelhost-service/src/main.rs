//! wheelhostd - phone-to-gamepad bridge daemon
//!
//! Listens for telemetry from the phone wheel app over UDP, drives the
//! platform gamepad sidecar, and returns force-feedback telemetry.

#![deny(static_mut_refs)]

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wheelhost_core::{BridgeTarget, ExitCode, FfbMode, HostConfig};
use wheelhost_service::Daemon;

#[derive(Parser)]
#[command(name = "wheelhostd")]
#[command(about = "Phone wheel to virtual gamepad bridge daemon")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the UDP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the emulated controller class (x360, ds4, dkbridge).
    #[arg(long)]
    target: Option<BridgeTarget>,

    /// Override the FFB mode (passthrough, synthetic, hybrid).
    #[arg(long = "ffb-mode")]
    ffb_mode: Option<FfbMode>,

    /// Override the sidecar executable path.
    #[arg(long = "bridge-exe")]
    bridge_exe: Option<String>,

    /// Override the audio helper path; empty disables audio haptics.
    #[arg(long = "audio-helper")]
    audio_helper: Option<String>,

    /// tracing env-filter directive, e.g. "wheelhost=debug,info".
    #[arg(long, env = "WHEELHOST_LOG")]
    log: Option<String>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut HostConfig) {
        if let Some(port) = self.port {
            config.udp.port = port;
        }
        if let Some(target) = self.target {
            config.bridge.target = target;
        }
        if let Some(mode) = self.ffb_mode {
            config.ffb.mode = mode;
        }
        if let Some(exe) = &self.bridge_exe {
            config.bridge.exe = exe.clone();
        }
        if let Some(helper) = &self.audio_helper {
            config.audio.helper = helper.clone();
        }
        if let Some(filter) = &self.log {
            config.log_filter = filter.clone();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli).await.code());
}

async fn run(cli: Cli) -> ExitCode {
    // A provisional subscriber until the config's filter is known.
    let filter = cli
        .log
        .clone()
        .unwrap_or_else(|| "wheelhost=info,info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    info!("wheelhostd v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => match HostConfig::default_path() {
            Ok(path) => path,
            Err(e) => {
                error!("cannot resolve config path: {e}");
                return ExitCode::BadConfig;
            }
        },
    };

    let mut config = match HostConfig::load(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            error!("configuration failure: {e:#}");
            return ExitCode::BadConfig;
        }
    };
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        error!("configuration failure: {e}");
        return ExitCode::BadConfig;
    }

    if cli.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(text) => println!("{text}"),
            Err(e) => error!("cannot render config: {e}"),
        }
        return ExitCode::Ok;
    }

    info!(
        port = config.udp.port,
        target = %config.bridge.target,
        ffb_mode = %config.ffb.mode,
        "configuration loaded"
    );

    Daemon::new(config).run().await
}
