//! Wallet role: joins a session from a pairing code and answers requests.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use pl_proto::{parse_pairing_code, PeerRole, RelayMessage, RequestPayload, ResponsePayload};
use pl_store::{clear_session, load_fresh_session, load_session, KeyValueStore, SessionRecord};

use crate::config::SessionConfig;
use crate::driver::{self, CoreHandle, RoleHooks};
use crate::error::SessionError;
use crate::events::{DisconnectReason, EventBus, SessionEvent, Subscription};
use crate::lifecycle::SessionState;
use crate::requests::{PendingRequests, SignRequest};
use crate::session::Session;
use crate::signer::{build_approval, WalletSigner};
use crate::transport::Connector;

struct WalletHooks {
    pending: PendingRequests,
}

impl RoleHooks for WalletHooks {
    fn role(&self) -> PeerRole {
        PeerRole::Wallet
    }

    fn on_application(
        &mut self,
        message: &RelayMessage,
        _session: &mut Session,
    ) -> Result<Option<SessionEvent>, SessionError> {
        let kind = message.message_type.request_kind().ok_or_else(|| {
            SessionError::Protocol(format!("wallet does not accept {}", message.message_type))
        })?;
        let payload: RequestPayload = message.payload_as()?;
        let request = SignRequest {
            id: payload.id,
            kind,
            data: payload.data,
            origin: payload.origin,
            timestamp: message.timestamp,
        };
        self.pending.insert(request.clone())?;
        info!(request_id = %request.id, ?kind, "request pending");
        Ok(Some(SessionEvent::Request(request)))
    }

    fn on_terminated(&mut self) {
        self.pending.clear();
    }

    fn annotate_record(&self, record: &mut SessionRecord) {
        record.resolved_requests = self.pending.resolved_ids();
    }
}

/// The responding device. Holds at most one live session.
pub struct WalletClient {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    pending: PendingRequests,
    core: Option<CoreHandle>,
}

impl WalletClient {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            config,
            connector,
            store,
            events: EventBus::new(),
            pending: PendingRequests::default(),
            core: None,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.core.as_ref().map_or(SessionState::Idle, CoreHandle::state)
    }

    pub fn session(&self) -> Option<Session> {
        self.core.as_ref().and_then(CoreHandle::session)
    }

    /// Join the session described by `code`. Returns false, after emitting an
    /// error event, if the code is malformed or the relay is unreachable.
    pub async fn connect_from_qr(&mut self, code: &str) -> bool {
        let Some(pairing) = parse_pairing_code(code, &self.config.relay_address) else {
            warn!("rejected malformed pairing code");
            self.events.emit_error(&SessionError::Parse);
            return false;
        };
        let session = Session::new(
            pairing.session_id,
            pairing.session_key,
            pairing.relay_address,
        );
        self.start(session, Vec::new()).await
    }

    /// Resume the persisted session if it is younger than the max-age window.
    /// A stale or unreadable record is deleted and false is returned.
    pub async fn restore_session(&mut self) -> bool {
        let record = match load_fresh_session(self.store.as_ref(), self.config.session_max_age_chrono()) {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                let err = SessionError::from(e);
                warn!(error = %err, "could not load stored session");
                self.events.emit_error(&err);
                return false;
            }
        };
        let session = match Session::from_record(&record) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding stored session with bad key");
                if let Err(e) = clear_session(self.store.as_ref()) {
                    warn!(error = %e, "failed to clear stored session");
                }
                self.events.emit_error(&SessionError::from(e));
                return false;
            }
        };
        info!(session_id = %session.session_id, "restoring session");
        self.start(session, record.resolved_requests).await
    }

    async fn start(&mut self, session: Session, resolved: Vec<String>) -> bool {
        if let Some(previous) = self.core.take() {
            previous.disconnect().await;
        }
        self.pending.clear();
        self.pending.remember_resolved(resolved);

        let hooks = WalletHooks {
            pending: self.pending.clone(),
        };
        match driver::establish(
            self.config.clone(),
            session,
            hooks,
            Arc::clone(&self.connector),
            Some(Arc::clone(&self.store)),
            self.events.clone(),
        )
        .await
        {
            Ok(core) => {
                self.core = Some(core);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to join session");
                self.events.emit_error(&err);
                false
            }
        }
    }

    /// Pending requests, oldest first.
    pub fn pending_requests(&self) -> Vec<SignRequest> {
        self.pending.list()
    }

    /// Send an approval for `id`. An unknown or already answered id is
    /// `NotFound`. If the response cannot be sent the request stays pending.
    pub async fn approve_request(&self, id: &str, response: Value) -> Result<(), SessionError> {
        let request = self
            .pending
            .take(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        self.respond(request, ResponsePayload::approved(id, response))
            .await
    }

    /// Send a rejection for `id`. Unknown ids are ignored.
    pub async fn reject_request(&self, id: &str, reason: Option<String>) -> Result<(), SessionError> {
        let Some(request) = self.pending.take(id) else {
            debug!(request_id = %id, "reject for unknown request ignored");
            return Ok(());
        };
        self.respond(request, ResponsePayload::rejected(id, reason))
            .await
    }

    /// Approve `id` with a result produced by `signer`.
    pub async fn approve_with_signer(
        &self,
        id: &str,
        signer: &dyn WalletSigner,
    ) -> Result<(), SessionError> {
        let request = self
            .pending
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let result = build_approval(&request, signer)?;
        self.approve_request(id, result).await
    }

    async fn respond(&self, request: SignRequest, payload: ResponsePayload) -> Result<(), SessionError> {
        let Some(core) = self.core.as_ref() else {
            return Err(SessionError::Closed);
        };
        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => {
                self.pending.restore(request);
                return Err(e.into());
            }
        };
        match core.send(request.kind.response_type(), value).await {
            Ok(()) => {
                info!(request_id = %request.id, approved = payload.approved, "response sent");
                Ok(())
            }
            // the driver is gone and has already cleared the book
            Err(SessionError::Closed) => Err(SessionError::Closed),
            Err(err) => {
                self.pending.restore(request);
                Err(err)
            }
        }
    }

    /// End the session: best-effort SESSION_END, close the link, clear
    /// pending requests and the stored record. Safe to call in any state and
    /// always followed by one `Disconnected` event. With no live driver the
    /// event names the stored session, or carries an empty id if there is none.
    pub async fn disconnect(&mut self) {
        let unreported = match self.core.take() {
            Some(core) => {
                let session_id = core.session_id().to_string();
                (!core.disconnect().await).then_some(session_id)
            }
            None => Some(
                load_session(self.store.as_ref())
                    .ok()
                    .flatten()
                    .map(|record| record.session_id)
                    .unwrap_or_default(),
            ),
        };
        self.pending.clear();
        if let Err(e) = clear_session(self.store.as_ref()) {
            warn!(error = %e, "failed to clear stored session");
        }
        if let Some(session_id) = unreported {
            self.events.emit(SessionEvent::Disconnected {
                session_id,
                reason: DisconnectReason::Local,
            });
        }
    }
}
