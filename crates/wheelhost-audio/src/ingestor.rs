//! Helper process supervision and latest-features publication.

use crate::line::{parse_helper_line, HelperMsg};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use wheelhost_core::AudioFeatures;

#[derive(Error, Debug)]
pub enum IngestorError {
    #[error("failed to spawn audio helper {path}: {source}")]
    Spawn {
        path: String,
        source: std::io::Error,
    },

    #[error("audio helper has no stdout pipe")]
    NoStdout,
}

/// What the reader task publishes: the latest features plus whether the
/// helper currently claims to be capturing.
#[derive(Debug, Clone, Default)]
pub struct AudioSnapshot {
    pub armed: bool,
    pub features: AudioFeatures,
}

/// Supervises the audio helper child and exposes its latest features.
///
/// A disabled ingestor (no helper configured) behaves as if every feature
/// were zero, which makes the mixer's synthetic path a no-op.
pub struct AudioIngestor {
    child: Option<Child>,
    snapshot_rx: watch::Receiver<AudioSnapshot>,
    parse_errors: Arc<AtomicU64>,
}

impl AudioIngestor {
    /// No helper configured: permanently disarmed.
    pub fn disabled() -> Self {
        let (_tx, rx) = watch::channel(AudioSnapshot::default());
        Self {
            child: None,
            snapshot_rx: rx,
            parse_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Launch the helper and start draining its stdout.
    pub fn spawn(helper_path: &Path) -> Result<Self, IngestorError> {
        let mut child = Command::new(helper_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| IngestorError::Spawn {
                path: helper_path.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(IngestorError::NoStdout)?;
        let (tx, rx) = watch::channel(AudioSnapshot::default());
        let parse_errors = Arc::new(AtomicU64::new(0));
        let task_errors = parse_errors.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut armed = false;
            let mut latest = AudioFeatures::default();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_helper_line(&line) {
                        Some(HelperMsg::Started { device }) => {
                            info!(device = %device, "audio helper capturing");
                            armed = true;
                            latest.device = device;
                            let _ = tx.send(AudioSnapshot {
                                armed,
                                features: latest.clone(),
                            });
                        }
                        Some(HelperMsg::Features(features)) => {
                            if armed {
                                latest = features;
                                let _ = tx.send(AudioSnapshot {
                                    armed,
                                    features: latest.clone(),
                                });
                            }
                        }
                        Some(HelperMsg::Stopped) => {
                            info!("audio helper stopped");
                            armed = false;
                            latest = AudioFeatures::default();
                            let _ = tx.send(AudioSnapshot::default());
                        }
                        None => {
                            task_errors.fetch_add(1, Ordering::Relaxed);
                            debug!("unrecognized audio helper line skipped");
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("audio helper read error: {e}");
                        break;
                    }
                }
            }
            debug!("audio helper stream closed");
            let _ = tx.send(AudioSnapshot::default());
        });

        info!("audio helper launched: {}", helper_path.display());
        Ok(Self {
            child: Some(child),
            snapshot_rx: rx,
            parse_errors,
        })
    }

    /// Latest features; zeros while disarmed.
    pub fn latest(&self) -> AudioFeatures {
        let snapshot = self.snapshot_rx.borrow();
        if snapshot.armed {
            snapshot.features.clone()
        } else {
            AudioFeatures::default()
        }
    }

    pub fn is_armed(&self) -> bool {
        self.snapshot_rx.borrow().armed
    }

    /// Lines skipped because they were not part of the protocol.
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Terminate the helper, if one is running.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            debug!("audio helper terminated");
        }
    }
}
