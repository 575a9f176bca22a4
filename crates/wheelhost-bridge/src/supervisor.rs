//! The sidecar supervisor: spawn, restart with backoff, rate-limited state
//! delivery, and event extraction.

use crate::events::{BridgeEvent, EventQueue};
use crate::frames::{encode_state, encode_target, parse_sidecar_line, state_differs, SidecarMsg};
use crate::sidecar::sidecar_command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wheelhost_core::clock::SharedClock;
use wheelhost_core::{BridgeTarget, GamepadState};

/// Consecutive garbage stdout lines tolerated before one restart.
const GARBAGE_TOLERANCE: u32 = 10;
/// First respawn delay; doubles per attempt.
const BACKOFF_BASE_MS: u64 = 100;
/// Respawn delay ceiling.
const BACKOFF_CAP_MS: u64 = 5000;
/// While respawning, a staged state older than this is dropped instead of
/// delivered to the fresh child.
pub const RESPAWN_QUEUE_MS: u64 = 250;
/// Depth of the stdin write channel; the loop never blocks on it.
const WRITE_CHANNEL_DEPTH: usize = 16;
/// Grace given to the child between pipe close and hard kill.
const SHUTDOWN_GRACE_MS: u64 = 500;

/// Backoff delay before respawn attempt `attempt` (0-based).
pub fn backoff_delay_ms(attempt: u32) -> u64 {
    BACKOFF_BASE_MS
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        .min(BACKOFF_CAP_MS)
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("no sidecar available after {attempts} spawn attempts")]
    BackoffCeiling { attempts: u32 },
}

/// Supervisor options, a narrow slice of the host config.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub target: BridgeTarget,
    /// Explicit child executable; empty selects the per-target default.
    pub exe: String,
    /// Max silence toward the child before a keepalive state line.
    pub keepalive_ms: u64,
    /// Spawn attempts before the backoff ceiling is declared fatal.
    pub max_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            target: BridgeTarget::platform_default(),
            exe: String::new(),
            keepalive_ms: 90,
            max_attempts: 8,
        }
    }
}

struct ChildIo {
    child: Child,
    stdin_tx: mpsc::Sender<String>,
}

/// Owns exactly one sidecar child and the duplex protocol with it.
pub struct BridgeSupervisor {
    config: SupervisorConfig,
    clock: SharedClock,
    events: EventQueue,
    io: Option<ChildIo>,
    /// Child said `ready`; state lines flow only after that.
    ready: bool,
    last_sent: Option<GamepadState>,
    last_send_ms: u64,
    /// Newest state staged while the child is down or not yet ready.
    pending: Option<(GamepadState, u64)>,
    /// Consecutive failed spawn attempts.
    attempt: u32,
    /// When the next spawn attempt is due, if the child is down.
    respawn_due_ms: Option<u64>,
    write_drops: Arc<AtomicU64>,
    garbage_lines: Arc<AtomicU64>,
    respawns: u64,
}

impl BridgeSupervisor {
    pub fn new(config: SupervisorConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            events: EventQueue::new(),
            io: None,
            ready: false,
            last_sent: None,
            last_send_ms: 0,
            pending: None,
            attempt: 0,
            respawn_due_ms: None,
            write_drops: Arc::new(AtomicU64::new(0)),
            garbage_lines: Arc::new(AtomicU64::new(0)),
            respawns: 0,
        }
    }

    pub fn target(&self) -> BridgeTarget {
        self.config.target
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_degraded(&self) -> bool {
        !self.ready
    }

    pub fn respawns(&self) -> u64 {
        self.respawns
    }

    pub fn write_drops(&self) -> u64 {
        self.write_drops.load(Ordering::Relaxed)
    }

    pub fn garbage_lines(&self) -> u64 {
        self.garbage_lines.load(Ordering::Relaxed)
    }

    pub fn queue_overflow(&self) -> u64 {
        self.events.overflow_count()
    }

    /// Eager initial spawn. A failure is not fatal here; the backoff
    /// schedule takes over and `tick` escalates at the ceiling.
    pub fn start(&mut self) {
        let now = self.clock.now_ms();
        if let Err(e) = self.spawn_child() {
            warn!("initial sidecar spawn failed: {e}");
            self.schedule_respawn(now);
        }
    }

    fn spawn_child(&mut self) -> std::io::Result<()> {
        let mut command = sidecar_command(self.config.target, &self.config.exe);
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("sidecar stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("sidecar stdout not piped"))?;

        // Writer task: the only owner of the pipe. Closing the channel
        // closes the pipe, which is the child's EOF.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(WRITE_CHANNEL_DEPTH);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                let mut framed = line;
                framed.push('\n');
                if stdin.write_all(framed.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
            debug!("sidecar writer closed");
        });

        // Reader task: translate stdout lines into events. Exactly one Bye
        // per stream end, whether EOF or garbage overrun.
        let events = self.events.clone();
        let clock = self.clock.clone();
        let garbage_lines = self.garbage_lines.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut consecutive_garbage = 0u32;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match parse_sidecar_line(&line) {
                        Ok(Some(SidecarMsg::Ready)) => {
                            consecutive_garbage = 0;
                            events.push(BridgeEvent::Ready);
                        }
                        Ok(Some(SidecarMsg::Ffb { l, r })) => {
                            consecutive_garbage = 0;
                            events.push(BridgeEvent::Ffb {
                                l,
                                r,
                                at_ms: clock.now_ms(),
                            });
                        }
                        Ok(Some(SidecarMsg::Diagnostic { level, note })) => {
                            consecutive_garbage = 0;
                            debug!(level = %level, "sidecar: {note}");
                        }
                        Ok(None) => {}
                        Err(()) => {
                            garbage_lines.fetch_add(1, Ordering::Relaxed);
                            consecutive_garbage += 1;
                            if consecutive_garbage >= GARBAGE_TOLERANCE {
                                warn!(
                                    lines = consecutive_garbage,
                                    "sidecar stdout is garbage, forcing restart"
                                );
                                break;
                            }
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("sidecar read error: {e}");
                        break;
                    }
                }
            }
            events.push(BridgeEvent::Bye);
        });

        // Live-retargetable children take the class as the first line.
        if let Some(control) = encode_target(self.config.target) {
            let _ = stdin_tx.try_send(control);
        }

        self.io = Some(ChildIo { child, stdin_tx });
        self.ready = false;
        self.respawn_due_ms = None;
        info!(target = %self.config.target, "sidecar spawned");
        Ok(())
    }

    fn schedule_respawn(&mut self, now_ms: u64) {
        let delay = backoff_delay_ms(self.attempt);
        self.attempt += 1;
        self.respawn_due_ms = Some(now_ms + delay);
        debug!(
            attempt = self.attempt,
            delay_ms = delay,
            "sidecar respawn scheduled"
        );
    }

    fn drop_child(&mut self) {
        // kill_on_drop reaps the process; the writer ends when its channel
        // closes, the reader on pipe EOF.
        self.io = None;
        self.ready = false;
    }

    /// Stage a state for delivery. While the child is up and ready it is
    /// written immediately when it differs from the last sent state or the
    /// keepalive window lapsed; otherwise the newest staged state waits for
    /// the next `ready` (bounded by [`RESPAWN_QUEUE_MS`]).
    pub fn push_state(&mut self, state: GamepadState, now_ms: u64) {
        if self.io.is_none() || !self.ready {
            self.pending = Some((state, now_ms));
            return;
        }
        let changed = self
            .last_sent
            .map_or(true, |sent| state_differs(&state, &sent));
        let keepalive_due = now_ms.saturating_sub(self.last_send_ms) >= self.config.keepalive_ms;
        if changed || keepalive_due {
            self.write_state(state, now_ms);
        }
    }

    fn write_state(&mut self, state: GamepadState, now_ms: u64) {
        let Some(io) = &self.io else {
            return;
        };
        match io.stdin_tx.try_send(encode_state(&state)) {
            Ok(()) => {
                self.last_sent = Some(state);
                self.last_send_ms = now_ms;
            }
            Err(_) => {
                self.write_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drive respawn and keepalive. Call once per loop tick. The only error
    /// is the backoff ceiling, which the caller treats as fatal.
    pub fn tick(&mut self, now_ms: u64) -> Result<(), SupervisorError> {
        if self.io.is_none() {
            match self.respawn_due_ms {
                Some(due) if now_ms >= due => {
                    if self.attempt >= self.config.max_attempts {
                        return Err(SupervisorError::BackoffCeiling {
                            attempts: self.attempt,
                        });
                    }
                    self.respawns += 1;
                    if let Err(e) = self.spawn_child() {
                        warn!(attempt = self.attempt, "sidecar respawn failed: {e}");
                        self.schedule_respawn(now_ms);
                    }
                }
                Some(_) => {}
                None => self.schedule_respawn(now_ms),
            }
            return Ok(());
        }

        // Continuous life-signs: repeat the last state (neutral before the
        // first push) when nothing new needed sending.
        if self.ready && now_ms.saturating_sub(self.last_send_ms) >= self.config.keepalive_ms {
            let state = self.last_sent.unwrap_or(GamepadState::NEUTRAL);
            self.write_state(state, now_ms);
        }
        Ok(())
    }

    /// Drain reader events, updating supervisor state. `Ready` flushes a
    /// fresh-enough pending state; `Bye` drops the child and schedules a
    /// respawn. The caller still sees every event (degraded tracking, FFB).
    pub fn drain_events(&mut self, now_ms: u64) -> Vec<BridgeEvent> {
        let events = self.events.drain();
        for event in &events {
            match event {
                BridgeEvent::Ready => {
                    self.ready = true;
                    self.attempt = 0;
                    self.last_sent = None;
                    if let Some((state, staged_ms)) = self.pending.take() {
                        if now_ms.saturating_sub(staged_ms) <= RESPAWN_QUEUE_MS {
                            self.write_state(state, now_ms);
                        } else {
                            debug!("stale pending state dropped on sidecar ready");
                        }
                    }
                }
                BridgeEvent::Bye => {
                    if self.io.is_some() {
                        warn!("sidecar stream ended");
                        self.drop_child();
                        self.schedule_respawn(now_ms);
                    }
                }
                BridgeEvent::Ffb { .. } => {}
            }
        }
        events
    }

    /// Change the emulated controller class. ViGEm-class children take a
    /// control line; the DriverKit helper (or a switch across helper
    /// binaries) needs a restart.
    pub fn set_target(&mut self, target: BridgeTarget, now_ms: u64) {
        if target == self.config.target {
            return;
        }
        let live = self.config.target.supports_live_retarget()
            && target.supports_live_retarget()
            && self.io.is_some();
        self.config.target = target;
        if live {
            if let (Some(io), Some(control)) = (&self.io, encode_target(target)) {
                if io.stdin_tx.try_send(control).is_ok() {
                    info!(target = %target, "sidecar retargeted");
                    return;
                }
            }
        }
        info!(target = %target, "sidecar restart for retarget");
        self.drop_child();
        self.attempt = 0;
        self.respawn_due_ms = Some(now_ms);
    }

    /// Flush a neutral state and terminate the child: close the pipe, give
    /// it a grace window, then hard-kill.
    pub async fn shutdown(&mut self) {
        let Some(io) = self.io.take() else {
            return;
        };
        let ChildIo { mut child, stdin_tx } = io;

        let _ = stdin_tx
            .send_timeout(
                encode_state(&GamepadState::NEUTRAL),
                Duration::from_millis(100),
            )
            .await;
        drop(stdin_tx);

        match tokio::time::timeout(
            Duration::from_millis(SHUTDOWN_GRACE_MS),
            child.wait(),
        )
        .await
        {
            Ok(Ok(status)) => debug!("sidecar exited: {status}"),
            Ok(Err(e)) => warn!("sidecar wait failed: {e}"),
            Err(_) => {
                warn!("sidecar ignored pipe close, killing");
                let _ = child.kill().await;
            }
        }
        self.ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wheelhost_core::{Clock, ManualClock};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_backoff_doubles_to_cap() {
        assert_eq!(backoff_delay_ms(0), 100);
        assert_eq!(backoff_delay_ms(1), 200);
        assert_eq!(backoff_delay_ms(2), 400);
        assert_eq!(backoff_delay_ms(5), 3200);
        assert_eq!(backoff_delay_ms(6), 5000);
        assert_eq!(backoff_delay_ms(30), 5000);
        assert_eq!(backoff_delay_ms(64), 5000);
    }

    fn manual_supervisor(max_attempts: u32) -> (BridgeSupervisor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                target: BridgeTarget::X360,
                exe: "/nonexistent/sidecar".into(),
                keepalive_ms: 90,
                max_attempts,
            },
            clock.clone(),
        );
        (supervisor, clock)
    }

    #[tokio::test]
    async fn test_backoff_ceiling_is_fatal() -> TestResult {
        let (mut supervisor, clock) = manual_supervisor(3);
        supervisor.start();

        // Walk the clock through every scheduled attempt until the ceiling.
        let mut fatal = None;
        for _ in 0..64 {
            clock.advance(5000);
            if let Err(e) = supervisor.tick(clock.now_ms()) {
                fatal = Some(e);
                break;
            }
        }
        match fatal {
            Some(SupervisorError::BackoffCeiling { attempts }) => {
                assert_eq!(attempts, 3);
            }
            other => panic!("expected backoff ceiling, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_states_stage_while_down() -> TestResult {
        let (mut supervisor, clock) = manual_supervisor(8);
        // No child at all: pushes stage the newest state.
        let mut state = GamepadState::NEUTRAL;
        state.rt = 10;
        supervisor.push_state(state, clock.now_ms());
        state.rt = 20;
        supervisor.push_state(state, clock.now_ms());
        assert_eq!(supervisor.pending.map(|(s, _)| s.rt), Some(20));
        Ok(())
    }

    /// Shell stand-in for a sidecar: announces ready, then mirrors nothing
    /// and sleeps so the pipe stays open.
    fn fake_sidecar(body: &str) -> std::io::Result<tempfile::TempPath> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "#!/bin/sh")?;
        writeln!(file, "{body}")?;
        let path = file.into_temp_path();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }

    async fn drain_until<F>(
        supervisor: &mut BridgeSupervisor,
        clock: &ManualClock,
        mut pred: F,
    ) -> Vec<BridgeEvent>
    where
        F: FnMut(&BridgeEvent) -> bool,
    {
        let mut seen = Vec::new();
        for _ in 0..200 {
            for event in supervisor.drain_events(clock.now_ms()) {
                let hit = pred(&event);
                seen.push(event);
                if hit {
                    return seen;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        seen
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ready_and_ffb_events() -> TestResult {
        let script = fake_sidecar(
            r#"echo '{"type":"ready"}'
echo '{"type":"ffb","rumbleL":0.5,"rumbleR":0.2}'
sleep 2"#,
        )?;
        let clock = Arc::new(ManualClock::new(0));
        let mut supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                exe: script.to_string_lossy().into_owned(),
                ..Default::default()
            },
            clock.clone(),
        );
        supervisor.start();

        let events = drain_until(&mut supervisor, &clock, |e| {
            matches!(e, BridgeEvent::Ffb { .. })
        })
        .await;
        assert!(events.contains(&BridgeEvent::Ready));
        assert!(events
            .iter()
            .any(|e| matches!(e, BridgeEvent::Ffb { l, r, .. } if (*l - 0.5).abs() < 1e-6 && (*r - 0.2).abs() < 1e-6)));
        assert!(supervisor.is_ready());
        supervisor.shutdown().await;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_garbage_stream_forces_single_restart() -> TestResult {
        // Ten garbage lines, then hold the pipe open: the reader must bail
        // out with exactly one Bye without waiting for EOF.
        let script = fake_sidecar(
            r#"echo '{"type":"ready"}'
i=0
while [ $i -lt 10 ]; do echo "garbage line $i"; i=$((i+1)); done
sleep 5"#,
        )?;
        let clock = Arc::new(ManualClock::new(0));
        let mut supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                exe: script.to_string_lossy().into_owned(),
                ..Default::default()
            },
            clock.clone(),
        );
        supervisor.start();

        let events =
            drain_until(&mut supervisor, &clock, |e| matches!(e, BridgeEvent::Bye)).await;
        let byes = events
            .iter()
            .filter(|e| matches!(e, BridgeEvent::Bye))
            .count();
        assert_eq!(byes, 1);
        assert!(supervisor.garbage_lines() >= 10);
        assert!(supervisor.is_degraded());
        supervisor.shutdown().await;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keepalive_resends_last_state() -> TestResult {
        let script = fake_sidecar(
            r#"echo '{"type":"ready"}'
cat > /dev/null"#,
        )?;
        let clock = Arc::new(ManualClock::new(0));
        let mut supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                exe: script.to_string_lossy().into_owned(),
                keepalive_ms: 90,
                ..Default::default()
            },
            clock.clone(),
        );
        supervisor.start();
        drain_until(&mut supervisor, &clock, |e| matches!(e, BridgeEvent::Ready)).await;

        let state = GamepadState {
            rt: 100,
            ..GamepadState::NEUTRAL
        };
        supervisor.push_state(state, clock.now_ms());
        let sent_at = supervisor.last_send_ms;

        // Unchanged state inside the keepalive window: no write.
        clock.advance(30);
        supervisor.push_state(state, clock.now_ms());
        assert_eq!(supervisor.last_send_ms, sent_at);

        // Past the window the same state goes out again as a life-sign.
        clock.advance(90);
        supervisor.tick(clock.now_ms())?;
        assert!(supervisor.last_send_ms > sent_at);
        supervisor.shutdown().await;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_duplicate_neutral_not_resent() -> TestResult {
        let script = fake_sidecar(
            r#"echo '{"type":"ready"}'
cat > /dev/null"#,
        )?;
        let clock = Arc::new(ManualClock::new(0));
        let mut supervisor = BridgeSupervisor::new(
            SupervisorConfig {
                exe: script.to_string_lossy().into_owned(),
                keepalive_ms: 90,
                ..Default::default()
            },
            clock.clone(),
        );
        supervisor.start();
        drain_until(&mut supervisor, &clock, |e| matches!(e, BridgeEvent::Ready)).await;

        supervisor.push_state(GamepadState::NEUTRAL, clock.now_ms());
        let first_send = supervisor.last_send_ms;
        clock.advance(10);
        supervisor.push_state(GamepadState::NEUTRAL, clock.now_ms());
        // Within the keepalive cadence the duplicate costs no write.
        assert_eq!(supervisor.last_send_ms, first_send);
        supervisor.shutdown().await;
        Ok(())
    }
}
