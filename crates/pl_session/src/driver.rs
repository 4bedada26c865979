//! Session driver shared by both roles.
//!
//! One tokio task per live session owns the relay link, the lifecycle state
//! machine, the channel keys and the heartbeat/backoff timers. Role adapters
//! talk to it through a command channel and observe it through `Shared`.
//! Inbound frames are handled one at a time on that task, so request
//! dispatch never overlaps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use pl_crypto::SessionKeys;
use pl_proto::{
    codec, EndPayload, ErrorPayload, HelloPayload, MessageType, PeerRole, RelayMessage,
};
use pl_store::{clear_session, save_session, KeyValueStore, SessionRecord};

use crate::config::SessionConfig;
use crate::error::{ErrorKind, SessionError};
use crate::events::{DisconnectReason, ErrorEvent, EventBus, SessionEvent};
use crate::lifecycle::{Lifecycle, NextStep, ReconnectPolicy, SessionState};
use crate::session::Session;
use crate::transport::{Connector, RelayConnection, TransportEvent};

/// What distinguishes the wallet from the dApp.
pub(crate) trait RoleHooks: Send + Sync + 'static {
    fn role(&self) -> PeerRole;

    /// An application message (request or response) received while Active.
    fn on_application(
        &mut self,
        message: &RelayMessage,
        session: &mut Session,
    ) -> Result<Option<SessionEvent>, SessionError>;

    /// The session reached Terminated; drop per-session role state.
    fn on_terminated(&mut self);

    /// Add role state to the record before it is saved.
    fn annotate_record(&self, _record: &mut SessionRecord) {}
}

/// Heartbeats alone refresh the stored `lastActivity` at most this often.
const ACTIVITY_SAVE_INTERVAL: Duration = Duration::from_secs(60);

enum Command {
    Send {
        message_type: MessageType,
        payload: Value,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

struct Shared {
    session: Mutex<Option<Session>>,
    state: Mutex<SessionState>,
}

/// Handle held by a role adapter. Dropping it detaches: the link closes
/// without SESSION_END and the stored record stays for `restore_session`.
pub(crate) struct CoreHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl CoreHandle {
    pub async fn send(&self, message_type: MessageType, payload: Value) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                message_type,
                payload,
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Safe from any state; returns once local cleanup is done. False when
    /// the driver had already stopped, in which case it emitted nothing for
    /// this call.
    pub async fn disconnect(self) -> bool {
        let (reply, rx) = oneshot::channel();
        let handled = self.commands.send(Command::Disconnect { reply }).is_ok() && rx.await.is_ok();
        let _ = self.task.await;
        handled
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.session.lock().clone()
    }
}

/// Open the first link, send the hello and hand the link to a driver task.
/// Fails without spawning anything if the relay cannot be reached.
pub(crate) async fn establish<H: RoleHooks>(
    config: SessionConfig,
    session: Session,
    hooks: H,
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: EventBus,
) -> Result<CoreHandle, SessionError> {
    let keys = SessionKeys::derive(&session.session_key)?;
    let mut lifecycle = Lifecycle::new(ReconnectPolicy::from(&config));
    lifecycle.begin_connect()?;

    let session_id = session.session_id.clone();
    let relay_address = session.relay_address.clone();
    let shared = Arc::new(Shared {
        session: Mutex::new(Some(session)),
        state: Mutex::new(lifecycle.state()),
    });
    let (commands, command_rx) = mpsc::unbounded_channel();

    let mut driver = Driver {
        config,
        hooks,
        connector,
        store,
        events,
        shared: Arc::clone(&shared),
        keys,
        lifecycle,
        commands: command_rx,
        session_id,
        relay_address,
        ack_sent: false,
        last_saved: None,
    };

    let conn = driver.open_link().await?;
    driver.on_transport_opened(&conn)?;
    driver.persist();
    info!(
        session_id = %driver.session_id,
        role = driver.hooks.role().as_str(),
        "joined relay"
    );

    let session_id = driver.session_id.clone();
    let task = tokio::spawn(driver.run(conn));
    Ok(CoreHandle {
        session_id,
        commands,
        shared,
        task,
    })
}

/// Why a driver task stopped.
enum End {
    /// `disconnect()` was called; the caller waits on the sender.
    Local(oneshot::Sender<()>),
    PeerEnded,
    Exhausted,
    /// Every handle was dropped. The stored record is left for a later
    /// `restore_session`.
    Detached,
}

enum Flow {
    Continue,
    PeerEnded,
}

struct Driver<H> {
    config: SessionConfig,
    hooks: H,
    connector: Arc<dyn Connector>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: EventBus,
    shared: Arc<Shared>,
    keys: SessionKeys,
    lifecycle: Lifecycle,
    commands: mpsc::UnboundedReceiver<Command>,
    session_id: String,
    relay_address: String,
    /// Whether we already sent SESSION_ACK on the current link.
    ack_sent: bool,
    last_saved: Option<Instant>,
}

impl<H: RoleHooks> Driver<H> {
    async fn run(mut self, mut conn: RelayConnection) {
        loop {
            if let Some(end) = self.pump(&mut conn).await {
                self.stop(Some(conn), end);
                return;
            }
            drop(conn);
            match self.reconnect().await {
                Ok(next) => conn = next,
                Err(end) => {
                    self.stop(None, end);
                    return;
                }
            }
        }
    }

    /// Service one link. Returns `None` when the link drops.
    async fn pump(&mut self, conn: &mut RelayConnection) -> Option<End> {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let rejoin_deadline = time::sleep(self.config.rejoin_timeout);
        tokio::pin!(rejoin_deadline);

        loop {
            tokio::select! {
                event = conn.recv() => match event {
                    Some(TransportEvent::Message(frame)) => {
                        if let Flow::PeerEnded = self.handle_frame(conn, &frame) {
                            return Some(End::PeerEnded);
                        }
                    }
                    Some(TransportEvent::Error(error)) => {
                        warn!(session_id = %self.session_id, %error, "relay transport error");
                        self.events.emit(SessionEvent::Error(ErrorEvent::new(
                            ErrorKind::Transport,
                            error,
                        )));
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!(session_id = %self.session_id, "relay link closed");
                        return None;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send { message_type, payload, reply }) => {
                        let result = if self.lifecycle.is_active() {
                            self.send_envelope(conn, message_type, payload)
                        } else {
                            Err(SessionError::NotActive)
                        };
                        if result.is_ok() && message_type.response_kind().is_some() {
                            self.persist();
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Disconnect { reply }) => return Some(End::Local(reply)),
                    None => return Some(End::Detached),
                },
                _ = &mut rejoin_deadline, if self.lifecycle.awaiting_rejoin() => {
                    warn!(
                        session_id = %self.session_id,
                        attempt = self.lifecycle.attempts(),
                        "peer did not acknowledge rejoin"
                    );
                    return None;
                }
                _ = heartbeat.tick() => {
                    if self.lifecycle.is_active() {
                        if let Err(e) = self.send_envelope(conn, MessageType::Heartbeat, Value::Null) {
                            warn!(session_id = %self.session_id, error = %e, "heartbeat failed");
                        }
                    }
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Result<RelayConnection, End> {
        self.lifecycle.transport_lost();
        self.sync_state();

        loop {
            let (attempt, delay) = match self.lifecycle.next_attempt() {
                NextStep::Retry { attempt, delay } => (attempt, delay),
                NextStep::GiveUp => {
                    let err = SessionError::Timeout(format!(
                        "relay unreachable after {} attempts",
                        self.config.max_reconnect_attempts
                    ));
                    warn!(session_id = %self.session_id, "giving up on relay");
                    self.events.emit_error(&err);
                    return Err(End::Exhausted);
                }
            };
            self.sync_state();
            info!(
                session_id = %self.session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );

            if let Some(end) = self.wait(delay).await {
                return Err(end);
            }

            match self.open_link().await {
                Ok(conn) => match self.on_transport_opened(&conn) {
                    Ok(()) => {
                        info!(session_id = %self.session_id, attempt, "relay link restored");
                        return Ok(conn);
                    }
                    Err(e) => {
                        warn!(session_id = %self.session_id, attempt, error = %e, "hello failed");
                        self.lifecycle.transport_lost();
                    }
                },
                Err(e) => {
                    warn!(session_id = %self.session_id, attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    }

    /// Sleep out a backoff delay. Sends are refused meanwhile; a disconnect
    /// cuts the wait short.
    async fn wait(&mut self, delay: std::time::Duration) -> Option<End> {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.commands.recv() => match command {
                    Some(Command::Send { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotActive));
                    }
                    Some(Command::Disconnect { reply }) => return Some(End::Local(reply)),
                    None => return Some(End::Detached),
                },
            }
        }
    }

    fn stop(&mut self, conn: Option<RelayConnection>, end: End) {
        match end {
            End::Local(reply) => {
                self.finish(conn, DisconnectReason::Local);
                let _ = reply.send(());
            }
            End::PeerEnded => self.finish(conn, DisconnectReason::PeerEnded),
            End::Exhausted => self.finish(conn, DisconnectReason::ReconnectExhausted),
            End::Detached => {
                self.lifecycle.terminate();
                self.sync_state();
                drop(conn);
                self.hooks.on_terminated();
                info!(session_id = %self.session_id, "session detached");
            }
        }
    }

    async fn open_link(&self) -> Result<RelayConnection, SessionError> {
        match time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.relay_address, &self.session_id),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(SessionError::Timeout(format!(
                "connect to {} timed out",
                self.relay_address
            ))),
        }
    }

    fn on_transport_opened(&mut self, conn: &RelayConnection) -> Result<(), SessionError> {
        self.lifecycle.transport_opened();
        self.ack_sent = false;
        self.sync_state();
        let role = self.hooks.role();
        let hello = serde_json::to_value(HelloPayload { role })?;
        self.send_envelope(conn, role.hello_type(), hello)
    }

    fn send_envelope(
        &self,
        conn: &RelayConnection,
        message_type: MessageType,
        payload: Value,
    ) -> Result<(), SessionError> {
        let message = RelayMessage::new(message_type, self.session_id.as_str(), payload);
        let frame = codec::seal(&message, &self.keys)?;
        conn.send(frame)?;
        trace!(session_id = %self.session_id, %message_type, "sent");
        Ok(())
    }

    fn handle_frame(&mut self, conn: &RelayConnection, frame: &str) -> Flow {
        let message = match codec::open(frame, &self.keys) {
            Ok(message) => message,
            Err(e) => {
                let err = SessionError::from(e);
                warn!(session_id = %self.session_id, error = %err, "dropping unreadable frame");
                self.events.emit_error(&err);
                return Flow::Continue;
            }
        };
        if let Err(err) = self.check_envelope(&message) {
            warn!(session_id = %self.session_id, error = %err, "dropping envelope");
            self.events.emit_error(&err);
            return Flow::Continue;
        }

        self.with_session(Session::touch);
        let heartbeat_only = message.message_type == MessageType::Heartbeat;
        let save_due = self
            .last_saved
            .map_or(true, |at| at.elapsed() >= ACTIVITY_SAVE_INTERVAL);
        if !heartbeat_only || save_due {
            self.persist();
        }
        trace!(session_id = %self.session_id, message_type = %message.message_type, "received");

        match message.message_type {
            MessageType::SessionInit | MessageType::SessionJoin => self.on_peer_hello(conn, &message),
            MessageType::SessionAck => self.on_ack(conn),
            MessageType::SessionEnd => {
                let reason = message
                    .payload_as::<EndPayload>()
                    .ok()
                    .and_then(|p| p.reason)
                    .unwrap_or_default();
                info!(session_id = %self.session_id, %reason, "peer ended session");
                return Flow::PeerEnded;
            }
            MessageType::Heartbeat => {}
            MessageType::Error => {
                let text = match message.payload_as::<ErrorPayload>() {
                    Ok(payload) => payload.message,
                    Err(_) => message.payload.to_string(),
                };
                warn!(session_id = %self.session_id, error = %text, "peer reported error");
                self.events
                    .emit(SessionEvent::Error(ErrorEvent::new(ErrorKind::Remote, text)));
            }
            _ => self.on_application(&message),
        }
        Flow::Continue
    }

    fn check_envelope(&self, message: &RelayMessage) -> Result<(), SessionError> {
        if message.session_id != self.session_id {
            return Err(SessionError::Protocol(format!(
                "envelope for foreign session {}",
                message.session_id
            )));
        }
        let drift_ms = (Utc::now() - message.timestamp).num_milliseconds().unsigned_abs();
        if u128::from(drift_ms) > self.config.max_clock_skew.as_millis() {
            return Err(SessionError::Protocol(format!(
                "{} stamped {drift_ms} ms away from local clock",
                message.message_type
            )));
        }
        Ok(())
    }

    fn on_peer_hello(&mut self, conn: &RelayConnection, message: &RelayMessage) {
        let hello = match message.payload_as::<HelloPayload>() {
            Ok(hello) => hello,
            Err(e) => {
                self.events.emit_error(&SessionError::from(e));
                return;
            }
        };
        if hello.role == self.hooks.role() {
            let err = SessionError::Protocol(format!(
                "peer joined with our own role {}",
                hello.role.as_str()
            ));
            warn!(session_id = %self.session_id, error = %err, "rejecting hello");
            self.events.emit_error(&err);
            return;
        }
        debug!(session_id = %self.session_id, peer = hello.role.as_str(), "peer hello");
        match self.send_envelope(conn, MessageType::SessionAck, Value::Null) {
            Ok(()) => self.ack_sent = true,
            Err(e) => warn!(session_id = %self.session_id, error = %e, "ack failed"),
        }
    }

    fn on_ack(&mut self, conn: &RelayConnection) {
        if !self.lifecycle.ack_received() {
            debug!(session_id = %self.session_id, "ignoring repeated ack");
            return;
        }
        self.with_session(|s| s.is_connected = true);
        self.sync_state();
        self.persist();
        info!(session_id = %self.session_id, "session active");
        self.events.emit(SessionEvent::Connected {
            session_id: self.session_id.clone(),
        });

        if !self.ack_sent {
            match self.send_envelope(conn, MessageType::SessionAck, Value::Null) {
                Ok(()) => self.ack_sent = true,
                Err(e) => warn!(session_id = %self.session_id, error = %e, "ack failed"),
            }
        }
    }

    fn on_application(&mut self, message: &RelayMessage) {
        if !self.lifecycle.is_active() {
            let err = SessionError::Protocol(format!(
                "{} received before SESSION_ACK",
                message.message_type
            ));
            warn!(session_id = %self.session_id, error = %err, "dropping early message");
            self.events.emit_error(&err);
            return;
        }

        let outcome = {
            let mut guard = self.shared.session.lock();
            match guard.as_mut() {
                Some(session) => self.hooks.on_application(message, session),
                None => Err(SessionError::Closed),
            }
        };
        match outcome {
            Ok(Some(event)) => {
                self.persist();
                self.events.emit(event);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    message_type = %message.message_type,
                    error = %err,
                    "dropping message"
                );
                self.events.emit_error(&err);
            }
        }
    }

    /// Terminal cleanup. Timers are already gone (they live in `pump` and
    /// `wait`), so the SESSION_END below is the last network send.
    fn finish(&mut self, conn: Option<RelayConnection>, reason: DisconnectReason) {
        self.lifecycle.terminate();
        self.sync_state();

        if let (Some(conn), DisconnectReason::Local) = (&conn, reason) {
            let payload = serde_json::to_value(EndPayload {
                reason: Some("disconnect".into()),
            })
            .unwrap_or(Value::Null);
            let sent = self
                .send_envelope(conn, MessageType::SessionEnd, payload.clone())
                .or_else(|_| self.send_envelope(conn, MessageType::SessionEnd, payload));
            if let Err(e) = sent {
                debug!(session_id = %self.session_id, error = %e, "session end not sent");
            }
        }
        drop(conn);

        self.hooks.on_terminated();
        if let Some(store) = &self.store {
            if let Err(e) = clear_session(store.as_ref()) {
                warn!(session_id = %self.session_id, error = %e, "failed to clear stored session");
            }
        }
        *self.shared.session.lock() = None;

        info!(session_id = %self.session_id, ?reason, "session terminated");
        self.events.emit(SessionEvent::Disconnected {
            session_id: self.session_id.clone(),
            reason,
        });
    }

    fn sync_state(&self) {
        let state = self.lifecycle.state();
        *self.shared.state.lock() = state;
        self.with_session(|s| s.is_connected = state == SessionState::Active);
    }

    fn with_session(&self, f: impl FnOnce(&mut Session)) {
        if let Some(session) = self.shared.session.lock().as_mut() {
            f(session);
        }
    }

    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let mut record = match self.shared.session.lock().as_ref() {
            Some(session) => session.to_record(),
            None => return,
        };
        self.hooks.annotate_record(&mut record);
        match save_session(store.as_ref(), &record) {
            Ok(()) => self.last_saved = Some(Instant::now()),
            Err(e) => warn!(session_id = %self.session_id, error = %e, "failed to persist session"),
        }
    }
}
