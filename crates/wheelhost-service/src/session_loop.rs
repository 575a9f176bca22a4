//! The session loop: a single-threaded cooperative core ticking at the
//! configured rate. Each tick drains the socket, dispatches datagrams,
//! stages controller state, arbitrates feedback, and answers the phone.
//! Every time-based decision is a duration against the injected clock, so a
//! slower tick rate degrades gracefully instead of changing semantics.

use crate::endpoint::UdpEndpoint;
use crate::session::{Session, TeardownReason};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use wheelhost_audio::AudioIngestor;
use wheelhost_bridge::{BridgeEvent, BridgeSupervisor, SupervisorError};
use wheelhost_core::clock::SharedClock;
use wheelhost_core::{FeedbackState, GamepadState, HostConfig, SessionStats};
use wheelhost_feedback::FeedbackMixer;
use wheelhost_protocol::{encode_reply, Decoded, IgnoreReason, ProtocolCodec};
use wheelhost_translator::{InputTranslator, TranslatorConfig};

/// Datagrams larger than this are not valid phone packets.
const RECV_BUF_SIZE: usize = 4096;
/// Cadence of the periodic stats line.
const STATS_LOG_INTERVAL_MS: u64 = 5000;

pub struct SessionLoop {
    config: HostConfig,
    clock: SharedClock,
    endpoint: UdpEndpoint,
    codec: ProtocolCodec,
    translator: InputTranslator,
    mixer: FeedbackMixer,
    supervisor: BridgeSupervisor,
    audio: AudioIngestor,
    session: Option<Session>,
    stats: SessionStats,
    last_stats_log_ms: u64,
}

impl SessionLoop {
    pub fn new(
        config: HostConfig,
        clock: SharedClock,
        endpoint: UdpEndpoint,
        supervisor: BridgeSupervisor,
        audio: AudioIngestor,
    ) -> Self {
        let translator = InputTranslator::new(TranslatorConfig {
            expo: config.expo,
            deadzone: config.deadzone,
            latch_ticks: config.latch_ticks,
        });
        let mixer = FeedbackMixer::new(config.ffb.clone());
        Self {
            config,
            clock,
            endpoint,
            codec: ProtocolCodec::new(),
            translator,
            mixer,
            supervisor,
            audio,
            session: None,
            stats: SessionStats::default(),
            last_stats_log_ms: 0,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Whether the sidecar reported itself ready.
    pub fn bridge_ready(&self) -> bool {
        self.supervisor.is_ready()
    }

    /// Eagerly spawn the sidecar. `run` does this itself; call directly only
    /// when driving ticks by hand.
    pub fn start(&mut self) {
        self.supervisor.start();
    }

    /// Swap in a new configuration; effective from the next tick.
    pub fn reconfigure(&mut self, config: HostConfig) {
        self.translator.reconfigure(TranslatorConfig {
            expo: config.expo,
            deadzone: config.deadzone,
            latch_ticks: config.latch_ticks,
        });
        self.mixer.reconfigure(config.ffb.clone());
        self.supervisor
            .set_target(config.bridge.target, self.clock.now_ms());
        self.config = config;
    }

    /// Run until shutdown is signalled. The only fatal outcome is the
    /// sidecar backoff ceiling.
    pub async fn run(
        &mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), SupervisorError> {
        self.start();
        let mut next = tokio::time::Instant::now();
        loop {
            next += Duration::from_millis(self.config.tick_period_ms());
            tokio::select! {
                _ = tokio::time::sleep_until(next) => {
                    if let Err(e) = self.tick() {
                        self.shutdown_graceful().await;
                        return Err(e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    self.shutdown_graceful().await;
                    return Ok(());
                }
            }
        }
    }

    /// One loop iteration. Fully synchronous: every I/O touch point is a
    /// non-blocking probe.
    pub fn tick(&mut self) -> Result<(), SupervisorError> {
        let now = self.clock.now_ms();

        // Sidecar events first so this tick's reply reflects the freshest
        // FFB and degradation state.
        for event in self.supervisor.drain_events(now) {
            match event {
                BridgeEvent::Ready => self.mixer.set_degraded(false),
                BridgeEvent::Bye => {
                    self.stats.sidecar_respawns += 1;
                    self.mixer.set_degraded(true);
                }
                BridgeEvent::Ffb { l, r, at_ms } => self.mixer.on_native_ffb(l, r, at_ms),
            }
        }

        // Drain the socket until empty.
        let mut buf = [0u8; RECV_BUF_SIZE];
        while let Some((len, peer)) = self.endpoint.poll_recv(&mut buf, now) {
            let payload = &buf[..len];
            self.dispatch(payload, peer, now);
        }

        // Liveness.
        if let Some(session) = &self.session {
            if session.is_idle(now, self.config.idle_timeout_ms) {
                self.teardown(TeardownReason::IdleTimeout, now);
            }
        }

        // Stage and push controller state.
        if let Some(session) = &self.session {
            let state = if session.background {
                GamepadState::NEUTRAL
            } else {
                self.translator.tick_state()
            };
            self.supervisor.push_state(state, now);
        }
        self.supervisor.tick(now)?;

        // Reply to the phone.
        if let Some(session) = &self.session {
            let features = self.audio.latest();
            let reply = self.mixer.compose(&features, session.last_seq, now);
            let line = encode_reply(&reply);
            if !self.endpoint.send(line.as_bytes(), session.peer) {
                self.stats.reply_send_drops += 1;
            }
        }

        self.log_stats(now);
        Ok(())
    }

    fn dispatch(&mut self, payload: &[u8], peer: SocketAddr, now: u64) {
        if !self.endpoint.accepts(peer, now) {
            self.stats.foreign_peer += 1;
            return;
        }
        match self.codec.decode(payload) {
            Decoded::HelloOrInput(packet) => {
                if self.session.is_none() {
                    self.establish(peer, now);
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.touch(now);
                session.background = false;
                session.last_seq = packet.seq;
                self.stats.accepted += 1;
                self.stats.lat_g = packet.lat_g;
                self.translator.ingest(&packet);
                self.mixer
                    .note_steering(self.translator.last_steering(), now);
            }
            Decoded::Background => {
                if let Some(session) = self.session.as_mut() {
                    session.touch(now);
                    if !session.background {
                        info!("phone backgrounded, outputs frozen at neutral");
                        session.background = true;
                        self.translator.reset();
                    }
                }
            }
            Decoded::Disconnect => {
                if self.session.is_some() {
                    self.teardown(TeardownReason::Disconnect, now);
                }
            }
            Decoded::Ignore(reason) => {
                match reason {
                    IgnoreReason::NotJson => self.stats.not_json += 1,
                    IgnoreReason::BadSignature => self.stats.bad_signature += 1,
                    IgnoreReason::StaleSeq => self.stats.stale_seq += 1,
                    IgnoreReason::FineTune => self.stats.finetune += 1,
                }
                // Anything from the pinned peer counts as liveness, even
                // when the payload is dropped.
                if let Some(session) = self.session.as_mut() {
                    if session.peer == peer {
                        session.touch(now);
                    }
                }
            }
        }
    }

    fn establish(&mut self, peer: SocketAddr, now: u64) {
        self.endpoint.pin(peer);
        self.session = Some(Session::new(peer, now));
        self.translator.reset();
        self.mixer.on_session_start();
        self.stats.sessions_started += 1;
        info!("session established with {peer}");
    }

    fn teardown(&mut self, reason: TeardownReason, now: u64) {
        let Some(session) = self.session.take() else {
            return;
        };
        info!(peer = %session.peer, "session ended: {reason}");
        self.stats.sessions_ended += 1;

        // One neutral push so the pad centers; the supervisor dedups if it
        // already was neutral.
        self.supervisor.push_state(GamepadState::NEUTRAL, now);
        self.translator.reset();
        self.codec.reset();

        match reason {
            TeardownReason::Disconnect | TeardownReason::Shutdown => self.endpoint.release(),
            TeardownReason::IdleTimeout => self
                .endpoint
                .release_with_grace(now + self.config.peer_grace_ms),
        }
    }

    async fn shutdown_graceful(&mut self) {
        let now = self.clock.now_ms();
        info!("session loop shutting down");

        // Final reply: all channels zero so the phone stops rumbling.
        if let Some(session) = &self.session {
            let farewell = FeedbackState {
                ack: session.last_seq,
                ..Default::default()
            };
            self.endpoint
                .send(encode_reply(&farewell).as_bytes(), session.peer);
        }
        if self.session.is_some() {
            self.teardown(TeardownReason::Shutdown, now);
        }

        // The supervisor flushes a neutral state before the pipe closes and
        // escalates to a kill after its grace window.
        self.supervisor.shutdown().await;
        self.audio.shutdown().await;
    }

    fn log_stats(&mut self, now: u64) {
        if now.saturating_sub(self.last_stats_log_ms) < STATS_LOG_INTERVAL_MS {
            return;
        }
        self.last_stats_log_ms = now;
        self.stats.sidecar_write_drops = self.supervisor.write_drops();
        self.stats.sidecar_garbage_lines = self.supervisor.garbage_lines();
        self.stats.bridge_queue_overflow = self.supervisor.queue_overflow();
        self.stats.audio_parse_errors = self.audio.parse_errors();
        self.stats.udp_recv_errors = self.endpoint.recv_errors();
        debug!(
            accepted = self.stats.accepted,
            drops = self.stats.protocol_drops(),
            foreign = self.stats.foreign_peer,
            lat_g = self.stats.lat_g as f64,
            ffb_source = self.supervisor_source(now),
            "session stats"
        );
    }

    fn supervisor_source(&self, now: u64) -> &'static str {
        if self.supervisor.is_degraded() {
            "degraded"
        } else {
            self.mixer.source_label(now)
        }
    }
}
