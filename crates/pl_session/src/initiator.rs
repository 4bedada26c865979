//! dApp role: creates the session, shows the pairing code, sends requests.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use pl_crypto::{generate_session_id, generate_session_key};
use pl_proto::{
    build_pairing_code, AppInfo, PeerRole, RelayMessage, RequestKind, RequestPayload,
    ResponsePayload,
};

use crate::config::SessionConfig;
use crate::driver::{self, CoreHandle, RoleHooks};
use crate::error::SessionError;
use crate::events::{DisconnectReason, EventBus, SessionEvent, Subscription};
use crate::lifecycle::SessionState;
use crate::requests::{OutstandingRequests, SignResponse};
use crate::session::Session;
use crate::transport::Connector;

struct DappHooks {
    outstanding: OutstandingRequests,
}

impl RoleHooks for DappHooks {
    fn role(&self) -> PeerRole {
        PeerRole::Dapp
    }

    fn on_application(
        &mut self,
        message: &RelayMessage,
        session: &mut Session,
    ) -> Result<Option<SessionEvent>, SessionError> {
        let kind = message.message_type.response_kind().ok_or_else(|| {
            SessionError::Protocol(format!("dapp does not accept {}", message.message_type))
        })?;
        let payload: ResponsePayload = message.payload_as()?;
        self.outstanding.resolve(&payload.id, kind)?;

        if kind == RequestKind::Connect && payload.approved {
            let address = payload
                .result
                .as_ref()
                .and_then(|r| r.get("address"))
                .and_then(Value::as_str);
            if let Some(address) = address {
                session.peer_address = Some(address.to_string());
            }
        }
        info!(request_id = %payload.id, approved = payload.approved, "response received");

        Ok(Some(SessionEvent::Response(SignResponse {
            id: payload.id,
            kind,
            approved: payload.approved,
            result: payload.result,
            reason: payload.reason,
        })))
    }

    fn on_terminated(&mut self) {
        self.outstanding.clear();
    }
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    /// Show this to the wallet (scannable code or link).
    pub pairing_code: String,
    pub session_id: String,
}

/// The requesting device. Responses arrive as `SessionEvent::Response`.
pub struct DappInitiator {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    events: EventBus,
    outstanding: OutstandingRequests,
    core: Option<CoreHandle>,
}

impl DappInitiator {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            events: EventBus::new(),
            outstanding: OutstandingRequests::default(),
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

    /// Requests still waiting for a response.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Generate a fresh session, join the relay and return the pairing code.
    /// Any previous session is ended first.
    pub async fn create_session(&mut self) -> Result<CreatedSession, SessionError> {
        if let Some(previous) = self.core.take() {
            previous.disconnect().await;
        }
        self.outstanding.clear();

        let session_id = generate_session_id();
        let session_key = generate_session_key();
        let pairing_code = build_pairing_code(&session_id, &session_key, &self.config.relay_address);
        let session = Session::new(
            session_id.clone(),
            session_key,
            self.config.relay_address.clone(),
        );

        let hooks = DappHooks {
            outstanding: self.outstanding.clone(),
        };
        let core = driver::establish(
            self.config.clone(),
            session,
            hooks,
            Arc::clone(&self.connector),
            None,
            self.events.clone(),
        )
        .await?;
        self.core = Some(core);
        info!(session_id = %session_id, "session created, waiting for wallet");

        Ok(CreatedSession {
            pairing_code,
            session_id,
        })
    }

    pub async fn request_connect(&self, app: &AppInfo) -> Result<String, SessionError> {
        self.send_request(RequestKind::Connect, serde_json::to_value(app)?)
            .await
    }

    pub async fn request_sign_message(&self, text: &str) -> Result<String, SessionError> {
        self.send_request(RequestKind::Message, json!({ "message": text }))
            .await
    }

    pub async fn request_sign_transaction(&self, transaction: Value) -> Result<String, SessionError> {
        self.send_request(RequestKind::Transaction, transaction)
            .await
    }

    /// Returns the request id; the answer is delivered as an event.
    async fn send_request(&self, kind: RequestKind, data: Value) -> Result<String, SessionError> {
        let core = self.core.as_ref().ok_or(SessionError::NotActive)?;
        let payload = RequestPayload::new(self.config.origin.as_str(), data);
        let id = payload.id.clone();

        // registered before sending so a fast answer always finds its entry
        self.outstanding.register(&id, kind);
        let sent = match serde_json::to_value(&payload) {
            Ok(value) => core.send(kind.request_type(), value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(err) = sent {
            self.outstanding.forget(&id);
            return Err(err);
        }
        info!(request_id = %id, ?kind, "request sent");
        Ok(id)
    }

    /// End the session for both sides. Always followed by one `Disconnected`
    /// event; its id is empty if no session was ever created.
    pub async fn disconnect(&mut self) {
        let unreported = match self.core.take() {
            Some(core) => {
                let session_id = core.session_id().to_string();
                (!core.disconnect().await).then_some(session_id)
            }
            None => Some(String::new()),
        };
        self.outstanding.clear();
        if let Some(session_id) = unreported {
            self.events.emit(SessionEvent::Disconnected {
                session_id,
                reason: DisconnectReason::Local,
            });
        }
    }
}
