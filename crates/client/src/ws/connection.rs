//! One hub subscription over tokio-tungstenite.
//!
//! Each connection runs in its own task and reports everything it sees to
//! the driver as [`Input`]s tagged with its [`ConnectionId`]. The task never
//! touches session state.

use std::time::Duration;

use chrono::Utc;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::driver::Input;
use crate::normalize::Frame;
use crate::session::ConnectionId;

/// How long to wait for the hub to confirm a client-initiated close.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Close frame received without a status code.
const NO_STATUS_CODE: u16 = 1005;

enum ConnectionCommand {
    Close { code: u16, reason: String },
}

/// Driver-side handle to a running connection task.
pub(crate) struct ConnectionHandle {
    commands: UnboundedSender<ConnectionCommand>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Ask the task to close the socket cleanly.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        let sent = self.commands.unbounded_send(ConnectionCommand::Close {
            code,
            reason: reason.to_string(),
        });
        if sent.is_err() {
            // Task already finished.
            self.task.abort();
        }
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

/// Spawn a task that connects to `url` and pumps frames to `inputs`.
pub(crate) fn open(
    id: ConnectionId,
    url: String,
    inputs: mpsc::UnboundedSender<Input>,
) -> ConnectionHandle {
    let (commands, receiver) = unbounded();
    let task = tokio::spawn(run_connection(id, url, receiver, inputs));
    ConnectionHandle { commands, task }
}

async fn run_connection(
    id: ConnectionId,
    url: String,
    mut commands: UnboundedReceiver<ConnectionCommand>,
    inputs: mpsc::UnboundedSender<Input>,
) {
    let ws_stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                let _ = inputs.send(Input::TransportError(id, e.to_string()));
                return;
            }
        },
        _ = commands.next() => {
            crate::log_debug!("connection {:?} cancelled before the handshake finished", id);
            return;
        }
    };

    crate::log_debug!("connection {:?} open", id);
    let _ = inputs.send(Input::Opened(id));
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame = Frame::Text(text.to_string());
                    let _ = inputs.send(Input::Frame(id, frame, Utc::now()));
                }
                Some(Ok(Message::Binary(data))) => {
                    let frame = Frame::Binary(data.to_vec());
                    let _ = inputs.send(Input::Frame(id, frame, Utc::now()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_CODE, String::new()));
                    let _ = inputs.send(Input::Closed(id, code, reason));
                    return;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite.
                }
                Some(Err(e)) => {
                    let _ = inputs.send(Input::TransportError(id, e.to_string()));
                    return;
                }
                None => {
                    let _ = inputs.send(Input::Closed(id, 1006, "connection lost".to_string()));
                    return;
                }
            },
            cmd = commands.next() => {
                let (code, reason) = match cmd {
                    Some(ConnectionCommand::Close { code, reason }) => (code, reason),
                    None => (1000, String::new()),
                };
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    crate::log_debug!("close frame for {:?} not sent: {}", id, e);
                }

                // Wait for the hub's confirmation so the close is observed.
                let confirmed = tokio::time::timeout(CLOSE_GRACE, async {
                    while let Some(msg) = read.next().await {
                        if let Ok(Message::Close(frame)) = msg {
                            return frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                        }
                    }
                    None
                })
                .await
                .ok()
                .flatten();

                let (code, reason) = confirmed.unwrap_or((code, reason));
                let _ = inputs.send(Input::Closed(id, code, reason));
                return;
            }
        }
    }
}
