//! The single task that owns a [`Session`] and the tokio-backed
//! [`SessionIo`] it runs on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hubview_shared::{AuthError, ClientError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use super::connection::{self, ConnectionHandle};
use crate::config::SessionConfig;
use crate::credential::{Credential, CredentialProvider, Secret};
use crate::normalize::Frame;
use crate::session::{
    ConnectionId, FetchId, ReconnectConfig, Session, SessionIo, SessionView, TimerId,
    CONFIG_DEBOUNCE,
};

/// Everything that can wake the driver besides user commands.
#[derive(Debug)]
pub(crate) enum Input {
    Opened(ConnectionId),
    Frame(ConnectionId, Frame, DateTime<Utc>),
    TransportError(ConnectionId, String),
    Closed(ConnectionId, u16, String),
    Timer(TimerId),
    Credential(FetchId, Result<Credential, AuthError>),
}

/// User-side requests to the driver.
#[derive(Debug)]
pub enum SessionCommand {
    Connect(SessionConfig),
    UpdateConfig(SessionConfig),
    Disconnect,
    SelectProducer(String),
    ClearSelection,
    ClearLog,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub reconnect: ReconnectConfig,
    pub debounce: Duration,
    /// How often the view is republished so relative times stay fresh.
    pub tick: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            debounce: CONFIG_DEBOUNCE,
            tick: Duration::from_secs(1),
        }
    }
}

/// Cloneable handle for talking to a running driver.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Transport("session driver has stopped".to_string()))
    }

    pub fn connect(&self, config: SessionConfig) -> Result<(), ClientError> {
        self.send(SessionCommand::Connect(config))
    }

    pub fn update_config(&self, config: SessionConfig) -> Result<(), ClientError> {
        self.send(SessionCommand::UpdateConfig(config))
    }

    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::Disconnect)
    }

    pub fn select_producer(&self, producer_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(SessionCommand::SelectProducer(producer_id.into()))
    }

    pub fn clear_selection(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::ClearSelection)
    }

    pub fn clear_log(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::ClearLog)
    }

    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.send(SessionCommand::Shutdown)
    }

    /// Latest published view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

/// [`SessionIo`] on tokio: sockets, timers and credential fetches are
/// separate tasks that report back through `inputs`.
pub(crate) struct TokioIo {
    inputs: mpsc::UnboundedSender<Input>,
    provider: Arc<dyn CredentialProvider>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioIo {
    fn new(inputs: mpsc::UnboundedSender<Input>, provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            inputs,
            provider,
            connections: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    fn forget_connection(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    fn forget_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    fn shutdown(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        // Dropping a handle lets its task finish the close handshake alone.
        self.connections.clear();
    }
}

impl SessionIo for TokioIo {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn open_transport(&mut self, id: ConnectionId, url: &Url) {
        let handle = connection::open(id, url.to_string(), self.inputs.clone());
        self.connections.insert(id, handle);
    }

    fn close_transport(&mut self, id: ConnectionId, code: u16, reason: &str) {
        if let Some(handle) = self.connections.remove(&id) {
            handle.close(code, reason);
        }
    }

    fn schedule_timer(&mut self, id: TimerId, delay: Duration) {
        let inputs = self.inputs.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::Timer(id));
        });
        if let Some(previous) = self.timers.insert(id, task) {
            previous.abort();
        }
    }

    fn cancel_timer(&mut self, id: TimerId) {
        if let Some(task) = self.timers.remove(&id) {
            task.abort();
        }
    }

    fn fetch_credential(&mut self, id: FetchId, room_id: &str, secret: &Secret) {
        let inputs = self.inputs.clone();
        let provider = self.provider.clone();
        let room_id = room_id.to_string();
        let secret = secret.clone();
        tokio::spawn(async move {
            let result = provider.fetch_credential(&room_id, &secret).await;
            let _ = inputs.send(Input::Credential(id, result));
        });
    }
}

impl Drop for TokioIo {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for (_, conn) in self.connections.drain() {
            conn.abort();
        }
    }
}

/// Start a driver task. The session starts disconnected; send
/// [`SessionCommand::Connect`] to subscribe.
pub fn spawn_session(
    provider: Arc<dyn CredentialProvider>,
    options: DriverOptions,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let session = Session::new(TokioIo::new(input_tx, provider))
        .with_reconnect_config(options.reconnect)
        .with_debounce(options.debounce);
    let (view_tx, view_rx) = watch::channel(session.view());

    let task = tokio::spawn(run(session, command_rx, input_rx, view_tx, options.tick));
    let handle = SessionHandle {
        commands: command_tx,
        view: view_rx,
    };
    (handle, task)
}

async fn run(
    mut session: Session<TokioIo>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut inputs: mpsc::UnboundedReceiver<Input>,
    view: watch::Sender<SessionView>,
    tick: Duration,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Shutdown) | None => {
                    session.disconnect();
                    session.io_mut().shutdown();
                    view.send_replace(session.view());
                    crate::log_info!("session driver stopped");
                    return;
                }
                Some(command) => apply_command(&mut session, command),
            },
            Some(input) = inputs.recv() => apply_input(&mut session, input),
            _ = ticker.tick() => {}
        }
        view.send_replace(session.view());
    }
}

fn apply_command(session: &mut Session<TokioIo>, command: SessionCommand) {
    match command {
        SessionCommand::Connect(config) => session.connect(config),
        SessionCommand::UpdateConfig(config) => session.update_config(config),
        SessionCommand::Disconnect => session.disconnect(),
        SessionCommand::SelectProducer(id) => session.select_producer(id),
        SessionCommand::ClearSelection => session.clear_selection(),
        SessionCommand::ClearLog => session.clear_log(),
        SessionCommand::Shutdown => {}
    }
}

fn apply_input(session: &mut Session<TokioIo>, input: Input) {
    match input {
        Input::Opened(id) => session.on_transport_open(id),
        Input::Frame(id, frame, received_at) => session.on_frame(id, frame, received_at),
        Input::TransportError(id, message) => {
            session.io_mut().forget_connection(id);
            session.on_transport_error(id, &message);
        }
        Input::Closed(id, code, reason) => {
            session.io_mut().forget_connection(id);
            session.on_transport_closed(id, code, &reason);
        }
        Input::Timer(id) => {
            session.io_mut().forget_timer(id);
            session.on_timer(id);
        }
        Input::Credential(id, result) => session.on_credential(id, result),
    }
}
