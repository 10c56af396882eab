mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::{spawn_hub, stop, wait_for, HubAction};
use hubview_client::{
    spawn_session, ConnectionState, CredentialProvider, DriverOptions, HttpCredentialProvider,
    LogKind, Secret, SessionConfig,
};
use hubview_shared::{AuthError, CredentialRequest};
use serde_json::{json, Value};

const GOOD_SECRET: &str = "open-sesame";

#[derive(Clone, Default)]
struct IssuerState {
    issued: Arc<AtomicUsize>,
}

async fn issue(
    State(state): State<IssuerState>,
    Json(req): Json<CredentialRequest>,
) -> (StatusCode, Json<Value>) {
    if req.role != "sub" || req.secret.as_deref() != Some(GOOD_SECRET) {
        let detail = format!("secret {} is not valid", req.secret.unwrap_or_default());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"title": "Unauthorized", "detail": detail})),
        );
    }
    let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({"token": format!("tok-{}-{n}", req.room), "expiresIn": 3600})),
    )
}

async fn spawn_issuer() -> (SocketAddr, IssuerState) {
    let state = IssuerState::default();
    let app = Router::new()
        .route("/token", post(issue))
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

#[tokio::test]
async fn issuer_exchanges_secret_for_token() {
    let (addr, state) = spawn_issuer().await;
    let provider = HttpCredentialProvider::new(format!("http://{addr}/token"));

    let credential = provider
        .fetch_credential("room123", &Secret::Password(GOOD_SECRET.to_string()))
        .await
        .unwrap();
    assert_eq!(credential.token, "tok-room123-1");
    assert!(credential.expires_at.is_some());
    assert_eq!(state.issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_secret_is_not_echoed() {
    let (addr, _) = spawn_issuer().await;
    let provider = HttpCredentialProvider::new(format!("http://{addr}/token"));

    let err = provider
        .fetch_credential("room123", &Secret::Password("hunter2".to_string()))
        .await
        .unwrap_err();
    match &err {
        AuthError::Rejected { status, detail } => {
            assert_eq!(*status, 401);
            let detail = detail.as_deref().unwrap();
            assert!(!detail.contains("hunter2"), "detail was {detail}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!err.to_string().contains("hunter2"));
}

#[tokio::test]
async fn issuer_failures_are_unreachable() {
    let (addr, _) = spawn_issuer().await;
    let secret = Secret::Password(GOOD_SECRET.to_string());

    let broken = HttpCredentialProvider::new(format!("http://{addr}/broken"));
    let err = broken.fetch_credential("room123", &secret).await.unwrap_err();
    assert!(matches!(err, AuthError::Unreachable(_)), "got {err:?}");

    let closed_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let nobody = HttpCredentialProvider::new(format!("http://{closed_port}/token"));
    let err = nobody.fetch_credential("room123", &secret).await.unwrap_err();
    assert!(matches!(err, AuthError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
async fn expired_credential_is_refreshed_once() {
    let (issuer_addr, state) = spawn_issuer().await;
    let mut hub = spawn_hub(vec![vec![HubAction::Close(4003, "token expired")]]).await;

    let provider = Arc::new(HttpCredentialProvider::new(format!(
        "http://{issuer_addr}/token"
    )));
    let (handle, task) = spawn_session(provider, DriverOptions::default());
    let mut views = handle.subscribe();
    let config = SessionConfig::new(hub.endpoint(), "room123")
        .with_secret(Secret::Password(GOOD_SECRET.to_string()))
        .requiring_credential(true);
    handle.connect(config).unwrap();

    let first = hub.next_uri().await;
    assert!(first.contains("token=tok-room123-1"), "uri was {first}");
    let second = hub.next_uri().await;
    assert!(second.contains("token=tok-room123-2"), "uri was {second}");

    let view = wait_for(&mut views, "connected with the fresh token", |v| {
        v.state == ConnectionState::Connected && v.log.iter().any(|e| e.kind == LogKind::Close)
    })
    .await;
    assert_eq!(state.issued.load(Ordering::SeqCst), 2);
    assert_eq!(hub.accepted(), 2);
    for entry in &view.log {
        assert!(!entry.summary.contains("tok-room123"), "{}", entry.summary);
        assert!(!entry.summary.contains(GOOD_SECRET), "{}", entry.summary);
    }

    stop(handle, task).await;
}

#[tokio::test]
async fn rejected_secret_stops_the_session() {
    let (issuer_addr, _) = spawn_issuer().await;
    let hub = spawn_hub(Vec::new()).await;

    let provider = Arc::new(HttpCredentialProvider::new(format!(
        "http://{issuer_addr}/token"
    )));
    let (handle, task) = spawn_session(provider, DriverOptions::default());
    let mut views = handle.subscribe();
    let config = SessionConfig::new(hub.endpoint(), "room123")
        .with_secret(Secret::Password("wrong".to_string()))
        .requiring_credential(true);
    handle.connect(config).unwrap();

    let view = wait_for(&mut views, "rejection logged", |v| {
        v.log.iter().any(|e| e.kind == LogKind::Error)
    })
    .await;
    assert_eq!(view.state, ConnectionState::Disconnected);
    assert_eq!(hub.accepted(), 0);

    stop(handle, task).await;
}
