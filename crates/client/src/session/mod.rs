//! Connection manager: the subscriber's lifecycle state machine.
//!
//! [`Session`] owns every piece of mutable client state (connection state,
//! producer table, event log) and never performs I/O itself. Effects go out
//! through [`SessionIo`]; stimuli come back in as method calls tagged with
//! the id of the connection, timer or credential fetch they belong to.
//! Anything tagged with an id that is no longer current is dropped, which is
//! how a superseded transport's trailing callbacks are ignored.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Connected
//!      ▲                        ▲                    │ close (transient)
//!      │ fatal / manual         │ timer              ▼
//!      └────────────────────────┴─────────────── Reconnecting
//! ```

pub mod backoff;
pub mod close_code;

use std::time::Duration;

use chrono::{DateTime, Utc};
use hubview_shared::{AuthError, ClientError, HubCloseCode};
use serde::Serialize;
use url::Url;

use crate::aggregator::{ProducerRecord, ProducerTable};
use crate::config::{redact_url, SessionConfig};
use crate::credential::{Credential, Secret};
use crate::event_log::{EventLog, LogEntry, LogKind};
use crate::normalize::{self, Frame};

pub use backoff::ReconnectConfig;
pub use close_code::{classify, CloseClass};

/// Quiet period after a configuration edit before reconnecting.
pub const CONFIG_DEBOUNCE: Duration = Duration::from_millis(250);

/// Code the client uses when it closes a transport itself.
const CLIENT_CLOSE_CODE: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FetchId(pub u64);

/// Connection state for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Capabilities the session needs from its platform.
///
/// Implementations report results back by calling the matching `on_*`
/// method on the session with the same id.
pub trait SessionIo {
    fn now(&self) -> DateTime<Utc>;
    fn open_transport(&mut self, id: ConnectionId, url: &Url);
    fn close_transport(&mut self, id: ConnectionId, code: u16, reason: &str);
    fn schedule_timer(&mut self, id: TimerId, delay: Duration);
    fn cancel_timer(&mut self, id: TimerId);
    fn fetch_credential(&mut self, id: FetchId, room_id: &str, secret: &Secret);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPurpose {
    Connect,
    Refresh,
}

#[derive(Debug, Clone, Copy)]
struct TransportSlot {
    id: ConnectionId,
    open: bool,
    /// Close requested by the client, not yet confirmed.
    closing: bool,
    closed: bool,
}

impl TransportSlot {
    fn live(&self) -> bool {
        !self.closing && !self.closed
    }
}

/// Snapshot of the session handed to renderers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    pub room_id: Option<String>,
    pub selected_producer_id: Option<String>,
    pub effective_producer_id: Option<String>,
    pub producers: Vec<ProducerRecord>,
    pub log: Vec<LogEntry>,
    pub generated_at: DateTime<Utc>,
}

impl SessionView {
    pub fn effective_producer(&self) -> Option<&ProducerRecord> {
        let id = self.effective_producer_id.as_deref()?;
        self.producers.iter().find(|p| p.producer_id == id)
    }
}

pub struct Session<Io> {
    io: Io,
    state: ConnectionState,
    manual_disconnect_requested: bool,
    reconnect_attempt: u32,
    active_config: Option<SessionConfig>,
    last_connection_used_credential: bool,
    reauth_in_flight: bool,
    transport: Option<TransportSlot>,
    reconnect_timer: Option<TimerId>,
    debounce_timer: Option<TimerId>,
    pending_fetch: Option<(FetchId, FetchPurpose)>,
    next_id: u64,
    reconnect_config: ReconnectConfig,
    debounce: Duration,
    producers: ProducerTable,
    log: EventLog,
}

impl<Io: SessionIo> Session<Io> {
    pub fn new(io: Io) -> Self {
        Self {
            io,
            state: ConnectionState::Disconnected,
            manual_disconnect_requested: false,
            reconnect_attempt: 0,
            active_config: None,
            last_connection_used_credential: false,
            reauth_in_flight: false,
            transport: None,
            reconnect_timer: None,
            debounce_timer: None,
            pending_fetch: None,
            next_id: 0,
            reconnect_config: ReconnectConfig::default(),
            debounce: CONFIG_DEBOUNCE,
            producers: ProducerTable::new(),
            log: EventLog::default(),
        }
    }

    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect_config = config;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    // --- accessors ---

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn manual_disconnect_requested(&self) -> bool {
        self.manual_disconnect_requested
    }

    pub fn reauth_in_flight(&self) -> bool {
        self.reauth_in_flight
    }

    pub fn last_connection_used_credential(&self) -> bool {
        self.last_connection_used_credential
    }

    pub fn active_config(&self) -> Option<&SessionConfig> {
        self.active_config.as_ref()
    }

    pub fn producers(&self) -> &ProducerTable {
        &self.producers
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn io(&self) -> &Io {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    pub fn is_transport_open(&self) -> bool {
        self.transport.is_some_and(|slot| slot.open)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            reconnect_attempt: self.reconnect_attempt,
            room_id: self.active_config.as_ref().map(|c| c.room_id.clone()),
            selected_producer_id: self.producers.selected().map(str::to_string),
            effective_producer_id: self.producers.effective_producer_id().map(str::to_string),
            producers: self.producers.records().to_vec(),
            log: self.log.to_vec(),
            generated_at: self.io.now(),
        }
    }

    // --- user actions ---

    /// Start (or restart) a subscription for `config`. Supersedes any
    /// pending retry, credential fetch or open transport.
    pub fn connect(&mut self, config: SessionConfig) {
        self.cancel_reconnect();
        self.cancel_debounce();
        self.pending_fetch = None;
        self.reauth_in_flight = false;
        self.manual_disconnect_requested = false;
        self.active_config = Some(config);
        self.start_connect();
    }

    /// Stop the subscription and suppress auto-reconnect. Idempotent.
    pub fn disconnect(&mut self) {
        let already = self.manual_disconnect_requested && self.state == ConnectionState::Disconnected;
        self.manual_disconnect_requested = true;
        self.cancel_reconnect();
        self.cancel_debounce();
        self.pending_fetch = None;
        self.reauth_in_flight = false;

        // Keep the slot so the peer's close confirmation is still logged.
        if let Some(slot) = self.transport.as_mut().filter(|slot| slot.live()) {
            slot.open = false;
            slot.closing = true;
            let id = slot.id;
            self.io.close_transport(id, CLIENT_CLOSE_CODE, "client disconnect");
        }
        if !already {
            self.set_state(ConnectionState::Disconnected, "disconnected by user");
        }
    }

    /// Replace the target configuration. If the endpoint, room or
    /// credential changed while a connection is live or pending, reconnect
    /// after a short quiet period.
    pub fn update_config(&mut self, mut config: SessionConfig) {
        if let Some(active) = &self.active_config {
            if config.credential.is_none() && active.same_target(&config) {
                config.credential = active.credential.clone();
            }
        }

        let changed = self.active_config.as_ref() != Some(&config);
        self.active_config = Some(config);
        if !changed {
            return;
        }

        if self.state == ConnectionState::Disconnected {
            self.append(LogKind::Info, "configuration updated");
            return;
        }

        self.cancel_reconnect();
        self.cancel_debounce();
        let id = TimerId(self.alloc_id());
        self.debounce_timer = Some(id);
        self.append(
            LogKind::Info,
            format!(
                "configuration changed; reconnecting in {}ms",
                self.debounce.as_millis()
            ),
        );
        self.io.schedule_timer(id, self.debounce);
    }

    pub fn select_producer(&mut self, producer_id: impl Into<String>) {
        self.producers.select(producer_id);
    }

    pub fn clear_selection(&mut self) {
        self.producers.clear_selection();
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    // --- transport callbacks ---

    pub fn on_transport_open(&mut self, id: ConnectionId) {
        let Some(slot) = self.current_slot_mut(id) else {
            crate::log_debug!("ignoring open from superseded connection {:?}", id);
            return;
        };
        if !slot.live() {
            return;
        }
        slot.open = true;
        self.reconnect_attempt = 0;
        let room = self.room_label();
        self.set_state(ConnectionState::Connected, format!("subscribed to room '{room}'"));
    }

    pub fn on_frame(&mut self, id: ConnectionId, frame: Frame, received_at: DateTime<Utc>) {
        match self.transport {
            Some(slot) if slot.id == id && slot.live() => {}
            _ => {
                crate::log_debug!("dropping frame from superseded connection {:?}", id);
                return;
            }
        }

        match normalize::handle(frame, received_at, &mut self.producers, &mut self.log) {
            Ok(outcome) => crate::log_debug!(
                "applied {} unit(s){}",
                outcome.units_applied,
                if outcome.snapshot { " from snapshot" } else { "" }
            ),
            Err(err) => crate::log_warn!("discarded frame: {}", err),
        }
    }

    /// Transport-level failure. Handled as an abnormal close.
    pub fn on_transport_error(&mut self, id: ConnectionId, message: &str) {
        if self.current_slot_mut(id).is_none() {
            return;
        }
        let err = ClientError::Transport(message.to_string());
        crate::log_error!("{}", err);
        self.append(LogKind::Error, err.to_string());
        self.on_transport_closed(id, HubCloseCode::Abnormal.code(), message);
    }

    pub fn on_transport_closed(&mut self, id: ConnectionId, code: u16, reason: &str) {
        let Some(slot) = self.current_slot_mut(id) else {
            crate::log_debug!("ignoring close from superseded connection {:?}", id);
            return;
        };
        slot.open = false;
        slot.closing = false;
        slot.closed = true;

        let close = HubCloseCode::from(code);
        let mut summary = format!("connection closed (code {code}");
        if !reason.is_empty() {
            summary.push_str(&format!(", reason: {reason}"));
        }
        summary.push(')');
        if let Some(hint) = close.hint() {
            summary.push_str(&format!("; {hint}"));
        }
        crate::log_info!("{}", summary);
        self.append(LogKind::Close, summary);

        if self.manual_disconnect_requested {
            self.set_state(ConnectionState::Disconnected, "closed after manual disconnect");
            return;
        }
        if self.reauth_in_flight {
            self.append(LogKind::Info, "credential refresh already in progress");
            return;
        }

        match classify(close) {
            CloseClass::Clean => {
                self.cancel_reconnect();
                self.set_state(ConnectionState::Disconnected, "hub closed the connection");
            }
            CloseClass::FatalConfig => {
                self.cancel_reconnect();
                self.set_state(
                    ConnectionState::Disconnected,
                    "not retrying; fix the room or role and connect again",
                );
            }
            CloseClass::FatalCredential => {
                self.cancel_reconnect();
                if let Some(config) = self.active_config.as_mut() {
                    config.credential = None;
                }
                self.set_state(
                    ConnectionState::Disconnected,
                    "not retrying; a new credential is required",
                );
            }
            CloseClass::CredentialExpired if self.last_connection_used_credential => {
                self.refresh_credential();
            }
            CloseClass::CredentialExpired | CloseClass::Transient => self.schedule_reconnect(),
        }
    }

    // --- timer and fetch callbacks ---

    pub fn on_timer(&mut self, id: TimerId) {
        if self.reconnect_timer == Some(id) {
            self.reconnect_timer = None;
            if !self.manual_disconnect_requested {
                self.start_connect();
            }
        } else if self.debounce_timer == Some(id) {
            self.debounce_timer = None;
            if !self.manual_disconnect_requested {
                self.pending_fetch = None;
                self.reauth_in_flight = false;
                self.start_connect();
            }
        } else {
            crate::log_debug!("ignoring stale timer {:?}", id);
        }
    }

    pub fn on_credential(&mut self, id: FetchId, result: Result<Credential, AuthError>) {
        let purpose = match self.pending_fetch {
            Some((pending, purpose)) if pending == id => purpose,
            _ => {
                crate::log_debug!("ignoring stale credential result {:?}", id);
                return;
            }
        };
        self.pending_fetch = None;
        if purpose == FetchPurpose::Refresh {
            self.reauth_in_flight = false;
        }

        match result {
            Ok(credential) => {
                let mut summary = "credential issued".to_string();
                if let Some(at) = credential.expires_at {
                    summary.push_str(&format!(", expires {}", at.to_rfc3339()));
                }
                self.append(LogKind::Info, summary);

                let Some(config) = self.active_config.as_mut() else {
                    return;
                };
                config.credential = Some(credential);
                let config = config.clone();
                let token = config.credential.as_ref().map(|c| c.token.clone());
                self.open_transport(&config, token.as_deref());
            }
            Err(err) => self.fail(err.into()),
        }
    }

    // --- internals ---

    fn start_connect(&mut self) {
        let Some(config) = self.active_config.clone() else {
            return;
        };
        // Retire the previous transport now, even if a credential fetch
        // delays the next open.
        self.cancel_reconnect();
        self.close_transport("superseded by a new connection");
        if let Err(err) = config.validate() {
            self.fail(err);
            return;
        }

        let now = self.io.now();
        let usable = config
            .credential
            .as_ref()
            .filter(|c| config.secret.is_none() || !c.is_expired(now));

        if usable.is_none() {
            if let Some(secret) = &config.secret {
                let id = FetchId(self.alloc_id());
                self.pending_fetch = Some((id, FetchPurpose::Connect));
                self.set_state(
                    ConnectionState::Connecting,
                    format!("requesting credential for room '{}'", config.room_id.trim()),
                );
                self.io.fetch_credential(id, config.room_id.trim(), secret);
                return;
            }
            if config.require_credential {
                self.fail(ClientError::Config(
                    "room requires a credential but no token or secret is configured".to_string(),
                ));
                return;
            }
        }

        let token = usable.map(|c| c.token.clone());
        self.open_transport(&config, token.as_deref());
    }

    fn open_transport(&mut self, config: &SessionConfig, token: Option<&str>) {
        self.cancel_reconnect();
        self.close_transport("superseded by a new connection");

        let url = match config.hub_url(token) {
            Ok(url) => url,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        let id = ConnectionId(self.alloc_id());
        self.transport = Some(TransportSlot {
            id,
            open: false,
            closing: false,
            closed: false,
        });
        self.last_connection_used_credential = token.is_some();
        self.set_state(
            ConnectionState::Connecting,
            format!("connecting to {}", redact_url(&url)),
        );
        self.io.open_transport(id, &url);
    }

    fn refresh_credential(&mut self) {
        if self.reauth_in_flight {
            self.append(LogKind::Info, "credential refresh already in progress");
            return;
        }
        let refresh_with = self
            .active_config
            .as_ref()
            .and_then(|c| c.secret.clone().map(|s| (c.room_id.trim().to_string(), s)));
        let Some((room_id, secret)) = refresh_with else {
            if let Some(config) = self.active_config.as_mut() {
                config.credential = None;
            }
            self.set_state(
                ConnectionState::Disconnected,
                "credential expired and no secret is available to refresh it",
            );
            return;
        };

        self.cancel_reconnect();
        self.reauth_in_flight = true;
        let id = FetchId(self.alloc_id());
        self.pending_fetch = Some((id, FetchPurpose::Refresh));
        self.set_state(
            ConnectionState::Reconnecting,
            "credential expired; requesting a fresh one",
        );
        self.io.fetch_credential(id, &room_id, &secret);
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        if !self.reconnect_config.allows(self.reconnect_attempt) {
            self.set_state(
                ConnectionState::Disconnected,
                format!(
                    "giving up after {} reconnect attempts",
                    self.reconnect_attempt
                ),
            );
            return;
        }

        let delay = self.reconnect_config.delay_for_attempt(self.reconnect_attempt);
        self.reconnect_attempt += 1;
        let id = TimerId(self.alloc_id());
        self.reconnect_timer = Some(id);
        self.set_state(
            ConnectionState::Reconnecting,
            format!(
                "reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                self.reconnect_attempt
            ),
        );
        self.io.schedule_timer(id, delay);
    }

    /// Surface an error and stop without retrying.
    fn fail(&mut self, err: ClientError) {
        crate::log_error!("{}", err);
        self.append(LogKind::Error, err.to_string());
        self.cancel_reconnect();
        self.close_transport("session failed");
        self.set_state(ConnectionState::Disconnected, "not retrying");
    }

    fn close_transport(&mut self, reason: &str) {
        if let Some(slot) = self.transport.take() {
            if slot.live() {
                self.io.close_transport(slot.id, CLIENT_CLOSE_CODE, reason);
            }
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(id) = self.reconnect_timer.take() {
            self.io.cancel_timer(id);
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(id) = self.debounce_timer.take() {
            self.io.cancel_timer(id);
        }
    }

    fn current_slot_mut(&mut self, id: ConnectionId) -> Option<&mut TransportSlot> {
        self.transport.as_mut().filter(|slot| slot.id == id)
    }

    fn set_state(&mut self, next: ConnectionState, detail: impl Into<String>) {
        let detail = detail.into();
        if next == self.state {
            if !detail.is_empty() {
                self.append(LogKind::Info, detail);
            }
            return;
        }
        let summary = format!("{} -> {}: {}", self.state, next, detail);
        crate::log_info!("{}", summary);
        self.state = next;
        self.append(LogKind::Status, summary);
    }

    fn append(&mut self, kind: LogKind, summary: impl Into<String>) {
        let now = self.io.now();
        self.log.append(LogEntry::new(kind, now, summary));
    }

    fn room_label(&self) -> String {
        self.active_config
            .as_ref()
            .map(|c| c.room_id.trim().to_string())
            .unwrap_or_default()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
