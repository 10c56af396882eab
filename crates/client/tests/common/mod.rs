//! In-process hub and session helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hubview_client::{SessionView, SessionHandle};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// What the hub does on one accepted connection, in order.
#[derive(Debug, Clone)]
pub enum HubAction {
    Send(String),
    Close(u16, &'static str),
}

pub struct Hub {
    pub addr: SocketAddr,
    /// Request URI of every accepted subscriber, in order.
    pub uris: mpsc::UnboundedReceiver<String>,
    accepted: Arc<AtomicUsize>,
}

impl Hub {
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn next_uri(&mut self) -> String {
        tokio::time::timeout(WAIT, self.uris.recv())
            .await
            .expect("timed out waiting for a subscriber")
            .expect("hub stopped")
    }
}

/// Start a hub on an ephemeral port. Connection `n` runs `scripts[n]`;
/// connections past the end of `scripts` just stay open.
pub async fn spawn_hub(scripts: Vec<Vec<HubAction>>) -> Hub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uris) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let actions = scripts.get(n).cloned().unwrap_or_default();
            let uri_tx = uri_tx.clone();

            tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                for action in actions {
                    match action {
                        HubAction::Send(text) => {
                            if ws.send(Message::text(text)).await.is_err() {
                                return;
                            }
                        }
                        HubAction::Close(code, reason) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            let _ = ws.close(Some(frame)).await;
                        }
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    Hub {
        addr,
        uris,
        accepted,
    }
}

/// Wait until the published view satisfies `pred`.
pub async fn wait_for(
    views: &mut watch::Receiver<SessionView>,
    what: &str,
    pred: impl Fn(&SessionView) -> bool,
) -> SessionView {
    let waited = tokio::time::timeout(WAIT, async {
        loop {
            {
                let view = views.borrow_and_update();
                if pred(&view) {
                    return view.clone();
                }
            }
            if views.changed().await.is_err() {
                panic!("driver stopped while waiting for {what}");
            }
        }
    })
    .await;
    waited.unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Shut the driver down and wait for its task.
pub async fn stop(handle: SessionHandle, task: JoinHandle<()>) {
    handle.shutdown().unwrap();
    tokio::time::timeout(WAIT, task)
        .await
        .expect("driver did not stop")
        .unwrap();
}
