//! Lifecycle of the upstream chat session.
//!
//! ```text
//! Disconnected -> Connecting -> (Authenticated) -> Open -> Closed
//!                     ^                                      |
//!                     +---------- transient closure ---------+
//!                                 logout -> Disconnected (halt)
//! ```
//!
//! Events are consumed one at a time in arrival order. A failure while
//! handling one event is logged and never stops the stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::audit;
use crate::common::{ConnectionStatus, DisconnectReason, RelayEvent, SessionEvent};
use crate::config::AppConfig;
use crate::error::{BridgeError, Result};
use crate::storage::Store;

use super::auth::AuthState;
use super::normalize::normalize;
use super::relay::Relay;
use super::upstream::Upstream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connecting with previously paired credentials.
    Authenticated,
    Open,
    Closed,
}

/// What the session loop does after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Reconnect,
    Halt,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: Option<u32>,
    pub audit_on_connect: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::ZERO,
            max_reconnect_attempts: None,
            audit_on_connect: true,
        }
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            audit_on_connect: config.audit_on_connect,
        }
    }
}

pub struct Session<U, A> {
    upstream: U,
    auth: A,
    relay: Relay,
    store: Arc<Store>,
    settings: SessionSettings,
    state: ConnectionState,
    /// Consecutive sessions that closed without reaching `Open`.
    failed_attempts: u32,
}

impl<U: Upstream, A: AuthState> Session<U, A> {
    pub fn new(
        upstream: U,
        auth: A,
        relay: Relay,
        store: Arc<Store>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            upstream,
            auth,
            relay,
            store,
            settings,
            state: ConnectionState::Disconnected,
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs sessions until one ends for good, and returns why it ended.
    pub async fn run(&mut self) -> BridgeError {
        loop {
            let flow = match self.start().await {
                Ok(events) => self.drive(events).await,
                Err(err) => {
                    log::warn!("Failed to open upstream session: {err}");
                    self.state = ConnectionState::Closed;
                    Flow::Reconnect
                }
            };

            if flow == Flow::Halt {
                return BridgeError::TerminalLogout;
            }

            self.failed_attempts += 1;
            if let Some(max) = self.settings.max_reconnect_attempts {
                if self.failed_attempts > max {
                    log::error!("Giving up after {max} reconnect attempts");
                    self.state = ConnectionState::Disconnected;
                    return BridgeError::TransientDisconnect(format!(
                        "no open session after {max} reconnect attempts"
                    ));
                }
            }
            if !self.settings.reconnect_delay.is_zero() {
                tokio::time::sleep(self.settings.reconnect_delay).await;
            }
            log::info!("Reconnecting (attempt {})", self.failed_attempts);
        }
    }

    /// Begins a session: loads credentials and asks the upstream to connect.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<SessionEvent>> {
        self.state = ConnectionState::Connecting;
        let credentials = match self.auth.load().await {
            Ok(credentials) => credentials,
            Err(err) => {
                log::warn!("{err}; starting fresh pairing");
                None
            }
        };
        if credentials.is_some() {
            self.state = ConnectionState::Authenticated;
        } else {
            log::info!("No stored credentials; waiting for QR pairing");
        }
        self.upstream.connect(credentials).await
    }

    /// Consumes events until the session closes. A stream that ends without a
    /// closure event counts as a closure for an unknown reason.
    async fn drive(&mut self, mut events: mpsc::Receiver<SessionEvent>) -> Flow {
        while let Some(event) = events.recv().await {
            let flow = self.handle_event(event).await;
            if flow != Flow::Continue {
                return flow;
            }
        }
        self.handle_event(SessionEvent::ConnectionClosed(DisconnectReason::Unknown))
            .await
    }

    pub async fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::QrIssued(qr) => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Authenticated
                ) {
                    log::info!("QR code generated");
                    self.relay.publish(&RelayEvent::QrCode(qr));
                } else {
                    log::debug!("Ignoring QR code while {:?}", self.state);
                }
                Flow::Continue
            }
            SessionEvent::CredsUpdated(credentials) => {
                if let Err(err) = self.auth.save(&credentials).await {
                    log::error!("{err}");
                }
                Flow::Continue
            }
            SessionEvent::ConnectionOpen => {
                log::info!("Upstream session connected");
                self.state = ConnectionState::Open;
                self.failed_attempts = 0;
                self.relay
                    .publish(&RelayEvent::Status(ConnectionStatus::Connected));
                if self.settings.audit_on_connect {
                    let relay = self.relay.clone();
                    let audited = self
                        .store
                        .blocking(move |store| audit::run_offline_audit(store, &relay))
                        .await;
                    match audited {
                        Ok(0) => {}
                        Ok(reported) => log::info!("Offline audit reported {reported} messages"),
                        Err(err) => log::error!("Offline audit failed: {err}"),
                    }
                }
                Flow::Continue
            }
            SessionEvent::ConnectionClosed(reason) => self.handle_closed(reason),
            SessionEvent::MessageReceived(payload) => {
                if self.state == ConnectionState::Open {
                    if let Err(err) = self.ingest(&payload).await {
                        log::warn!("Failed to process inbound message: {err}");
                    }
                } else {
                    log::debug!("Dropping inbound message received while {:?}", self.state);
                }
                Flow::Continue
            }
            SessionEvent::MessageEdited { id, edit } => {
                let edited_id = id.clone();
                let recorded = self
                    .store
                    .blocking(move |store| store.record_edit(&edited_id, edit))
                    .await;
                match recorded {
                    Ok(true) => log::debug!("Recorded edit of message {id}"),
                    Ok(false) => log::debug!("Edit for unknown message {id} ignored"),
                    Err(err) => log::error!("Failed to record edit of {id}: {err}"),
                }
                Flow::Continue
            }
        }
    }

    fn handle_closed(&mut self, reason: DisconnectReason) -> Flow {
        self.state = ConnectionState::Closed;
        if reason.is_terminal() {
            log::error!("Connection closed: {reason}. Logged out, not reconnecting");
            self.state = ConnectionState::Disconnected;
            self.relay
                .publish(&RelayEvent::Status(ConnectionStatus::LoggedOut));
            Flow::Halt
        } else {
            log::warn!("Connection closed: {reason}. Reconnecting");
            self.state = ConnectionState::Connecting;
            self.relay
                .publish(&RelayEvent::Status(ConnectionStatus::Reconnecting));
            Flow::Reconnect
        }
    }

    /// Persists and forwards one inbound message. Malformed payloads are dropped.
    async fn ingest(&self, payload: &serde_json::Value) -> Result<()> {
        let normalized = match normalize(payload, Utc::now().timestamp_millis()) {
            Ok(normalized) => normalized,
            Err(err @ BridgeError::MalformedInbound(_)) => {
                log::debug!("{err}; dropped");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        log::info!(
            "New message from {}: {}",
            normalized.notice.sender,
            normalized.notice.content
        );
        let message = normalized.message;
        let saved = self
            .store
            .blocking(move |store| store.save_message(message))
            .await;
        self.relay.publish(&RelayEvent::NewMessage(normalized.notice));
        saved.map(|_| ())
    }
}
