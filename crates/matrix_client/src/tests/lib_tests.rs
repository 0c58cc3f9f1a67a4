use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode as HttpStatus},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::{CreateRoomRequest, LoginRequest, MessageRequest, RefreshTokenRequest};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedSend {
    room: String,
    txn_id: String,
    authorization: Option<String>,
    body: String,
}

#[derive(Default)]
struct MockState {
    valid_token: String,
    refreshed_token: Option<String>,
    send_status: Option<u16>,
    invites: Vec<String>,
    logins: Vec<LoginRequest>,
    sends: Vec<RecordedSend>,
    joins: Vec<String>,
    created: Vec<(Option<String>, CreateRoomRequest)>,
    refresh_calls: u32,
}

#[derive(Clone)]
struct MockServer {
    state: Arc<Mutex<MockState>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_login(
    State(server): State<MockServer>,
    Json(request): Json<LoginRequest>,
) -> (HttpStatus, Json<Value>) {
    let mut state = server.state.lock().await;
    let ok = request.password == "hunter2";
    state.logins.push(request);
    if !ok {
        return (
            HttpStatus::FORBIDDEN,
            Json(json!({"errcode": "M_FORBIDDEN", "error": "Invalid password"})),
        );
    }
    (
        HttpStatus::OK,
        Json(json!({"access_token": "login-access", "refresh_token": "login-refresh"})),
    )
}

async fn handle_refresh(
    State(server): State<MockServer>,
    Json(request): Json<RefreshTokenRequest>,
) -> (HttpStatus, Json<Value>) {
    let mut state = server.state.lock().await;
    state.refresh_calls += 1;
    assert_eq!(request.refresh_token, "refresh-1");
    match state.refreshed_token.clone() {
        Some(token) => {
            state.valid_token = token.clone();
            (HttpStatus::OK, Json(json!({"access_token": token})))
        }
        None => (
            HttpStatus::UNAUTHORIZED,
            Json(json!({"errcode": "M_UNKNOWN_TOKEN", "error": "refresh token expired"})),
        ),
    }
}

async fn handle_send(
    State(server): State<MockServer>,
    Path((room, event_type, txn_id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> (HttpStatus, Json<Value>) {
    assert_eq!(event_type, "m.room.message");
    assert_eq!(request.msgtype, "m.text");
    let mut state = server.state.lock().await;
    let authorization = bearer(&headers);
    state.sends.push(RecordedSend {
        room,
        txn_id,
        authorization: authorization.clone(),
        body: request.body,
    });

    if let Some(status) = state.send_status {
        let status = HttpStatus::from_u16(status).expect("status");
        return (status, Json(json!({"errcode": "M_UNKNOWN", "error": "forced"})));
    }
    if authorization.as_deref() != Some(state.valid_token.as_str()) {
        return (
            HttpStatus::UNAUTHORIZED,
            Json(json!({"errcode": "M_UNKNOWN_TOKEN", "error": "expired"})),
        );
    }
    let event_id = format!("$event{}", state.sends.len());
    (HttpStatus::OK, Json(json!({ "event_id": event_id })))
}

async fn handle_joined_rooms(State(_server): State<MockServer>) -> Json<Value> {
    Json(json!({"joined_rooms": ["!a:example.org", "!b:example.org"]}))
}

async fn handle_sync(State(server): State<MockServer>) -> Json<Value> {
    let state = server.state.lock().await;
    let invite: serde_json::Map<String, Value> = state
        .invites
        .iter()
        .map(|room| (room.clone(), json!({})))
        .collect();
    Json(json!({"rooms": {"invite": invite, "join": {}}}))
}

async fn handle_join(
    State(server): State<MockServer>,
    Path(room): Path<String>,
) -> Json<Value> {
    server.state.lock().await.joins.push(room.clone());
    Json(json!({ "room_id": room }))
}

async fn handle_create_room(
    State(server): State<MockServer>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> (HttpStatus, Json<Value>) {
    let mut state = server.state.lock().await;
    let authorization = bearer(&headers);
    if authorization.as_deref() != Some(state.valid_token.as_str()) {
        return (
            HttpStatus::UNAUTHORIZED,
            Json(json!({"errcode": "M_UNKNOWN_TOKEN", "error": "expired"})),
        );
    }
    state.created.push((authorization, request));
    let room_id = format!("!created{}:example.org", state.created.len());
    (HttpStatus::OK, Json(json!({ "room_id": room_id })))
}

async fn spawn_homeserver(state: MockState) -> (String, Arc<Mutex<MockState>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = Arc::new(Mutex::new(state));
    let server = MockServer {
        state: state.clone(),
    };
    let app = Router::new()
        .route("/_matrix/client/v3/login", post(handle_login))
        .route("/_matrix/client/v3/refresh", post(handle_refresh))
        .route(
            "/_matrix/client/v3/rooms/:room/send/:event_type/:txn_id",
            put(handle_send),
        )
        .route("/_matrix/client/v3/joined_rooms", get(handle_joined_rooms))
        .route("/_matrix/client/v3/sync", get(handle_sync))
        .route("/_matrix/client/v3/join/:room", post(handle_join))
        .route("/_matrix/client/v3/createRoom", post(handle_create_room))
        .with_state(server);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn config_for(server_url: &str) -> MatrixConfig {
    MatrixConfig {
        server_domain: Some(server_url.to_string()),
        user_name: Some("alice".into()),
        access_token: Some("access-1".into()),
        refresh_token: Some("refresh-1".into()),
        target_room: Some("!room:example.org".into()),
    }
}

fn valid_state() -> MockState {
    MockState {
        valid_token: "access-1".into(),
        ..MockState::default()
    }
}

#[test]
fn bare_domain_uses_https_client_api() {
    let url = client_api_url("matrix.example.org").expect("url");
    assert_eq!(
        url.as_str(),
        "https://matrix.example.org/_matrix/client/v3/"
    );

    let url = client_api_url("http://127.0.0.1:8008/").expect("url");
    assert_eq!(url.as_str(), "http://127.0.0.1:8008/_matrix/client/v3/");
}

#[test]
fn dispatch_client_requires_complete_config() {
    let mut config = config_for("matrix.example.org");
    config.target_room = None;
    config.access_token = None;

    let err = MatrixClient::for_dispatch(&config)
        .err()
        .expect("must reject incomplete config");
    assert!(matches!(
        err,
        MatrixError::IncompleteConfig(ref missing) if missing == &vec!["access_token", "target_room"]
    ));
}

#[tokio::test]
async fn send_text_puts_message_with_bearer_token() {
    let (server_url, state) = spawn_homeserver(valid_state()).await;
    let mut client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let receipt = client.send_to_target("help me").await.expect("send");

    assert_eq!(receipt.event_id, "$event1");
    assert!(!receipt.refreshed);
    let state = state.lock().await;
    assert_eq!(state.sends.len(), 1);
    assert_eq!(state.sends[0].room, "!room:example.org");
    assert_eq!(state.sends[0].body, "help me");
    assert_eq!(state.sends[0].authorization.as_deref(), Some("access-1"));
    assert_eq!(state.refresh_calls, 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_send_retried_with_same_txn_id() {
    let (server_url, state) = spawn_homeserver(MockState {
        valid_token: "access-2".into(),
        refreshed_token: Some("access-2".into()),
        ..MockState::default()
    })
    .await;
    let mut client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let receipt = client.send_to_target("help me").await.expect("send");

    assert!(receipt.refreshed);
    assert_eq!(client.config().access_token.as_deref(), Some("access-2"));
    assert_eq!(client.config().refresh_token.as_deref(), Some("refresh-1"));
    let state = state.lock().await;
    assert_eq!(state.refresh_calls, 1);
    assert_eq!(state.sends.len(), 2);
    assert_eq!(state.sends[0].txn_id, state.sends[1].txn_id);
    assert_eq!(state.sends[1].authorization.as_deref(), Some("access-2"));
}

#[tokio::test]
async fn expired_token_without_refresh_token_fails() {
    let (server_url, state) = spawn_homeserver(MockState {
        valid_token: "other".into(),
        ..MockState::default()
    })
    .await;
    let mut config = config_for(&server_url);
    config.refresh_token = None;
    let mut client = MatrixClient::for_dispatch(&config).expect("client");

    let err = client.send_to_target("help me").await.expect_err("must fail");

    assert!(matches!(err, MatrixError::MissingToken("refresh token")));
    assert!(err.is_auth_failure());
    assert_eq!(state.lock().await.refresh_calls, 0);
}

#[tokio::test]
async fn refresh_returning_same_token_is_reported() {
    let (server_url, _state) = spawn_homeserver(MockState {
        valid_token: "other".into(),
        refreshed_token: Some("access-1".into()),
        ..MockState::default()
    })
    .await;
    let mut client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let err = client.send_to_target("help me").await.expect_err("must fail");
    assert!(matches!(err, MatrixError::TokenUnchanged));
}

#[tokio::test]
async fn rate_limit_and_server_errors_are_classified() {
    let (server_url, state) = spawn_homeserver(MockState {
        send_status: Some(429),
        ..valid_state()
    })
    .await;
    let mut client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let err = client.send_to_target("help").await.expect_err("429");
    assert!(matches!(err, MatrixError::RateLimited));

    state.lock().await.send_status = Some(502);
    let err = client.send_to_target("help").await.expect_err("502");
    assert!(matches!(err, MatrixError::Server { status, .. } if status.as_u16() == 502));
}

#[tokio::test]
async fn login_stores_tokens_and_uses_full_user_id() {
    let (server_url, state) = spawn_homeserver(valid_state()).await;
    let mut client = MatrixClient::new(&MatrixConfig {
        server_domain: Some(server_url),
        ..MatrixConfig::default()
    })
    .expect("client");

    client.login("alice", "hunter2").await.expect("login");

    let config = client.config();
    assert_eq!(config.user_name.as_deref(), Some("alice"));
    assert_eq!(config.access_token.as_deref(), Some("login-access"));
    assert_eq!(config.refresh_token.as_deref(), Some("login-refresh"));
    let state = state.lock().await;
    assert_eq!(state.logins[0].identifier.user, "@alice:127.0.0.1");
    assert_eq!(state.logins[0].kind, "m.login.password");
}

#[tokio::test]
async fn login_with_wrong_password_surfaces_server_error_text() {
    let (server_url, _state) = spawn_homeserver(valid_state()).await;
    let mut client = MatrixClient::new(&MatrixConfig {
        server_domain: Some(server_url),
        ..MatrixConfig::default()
    })
    .expect("client");

    let err = client.login("alice", "wrong").await.expect_err("must fail");
    assert!(matches!(err, MatrixError::Unauthorized(ref text) if text == "Invalid password"));
    assert!(client.config().access_token.is_none());
}

#[tokio::test]
async fn accept_invites_joins_every_pending_room() {
    let (server_url, state) = spawn_homeserver(MockState {
        invites: vec!["!x:example.org".into(), "!y:example.org".into()],
        ..valid_state()
    })
    .await;
    let client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let mut joined = client.accept_invites().await.expect("accept");
    joined.sort();

    assert_eq!(joined, vec!["!x:example.org", "!y:example.org"]);
    let mut joins = state.lock().await.joins.clone();
    joins.sort();
    assert_eq!(joins, joined);

    let rooms = client.joined_rooms().await.expect("joined rooms");
    assert_eq!(rooms, vec!["!a:example.org", "!b:example.org"]);
}

#[tokio::test]
async fn create_room_invites_full_user_id_and_returns_room_id() {
    let (server_url, state) = spawn_homeserver(valid_state()).await;
    let client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let room = client
        .create_room(Some("Alerts"), true, "bob")
        .await
        .expect("create room");
    assert_eq!(room, "!created1:example.org");

    let public = client
        .create_room(None, false, "@carol:example.org")
        .await
        .expect("create public room");
    assert_eq!(public, "!created2:example.org");

    let state = state.lock().await;
    let (authorization, request) = &state.created[0];
    assert_eq!(authorization.as_deref(), Some("access-1"));
    assert_eq!(request.name.as_deref(), Some("Alerts"));
    assert_eq!(request.visibility, "private");
    assert!(!request.is_direct);
    assert_eq!(request.invite, vec!["@bob:127.0.0.1"]);

    let (_, request) = &state.created[1];
    assert_eq!(request.name, None);
    assert_eq!(request.visibility, "public");
    assert_eq!(request.invite, vec!["@carol:example.org"]);
}

#[tokio::test]
async fn private_chat_is_a_direct_private_room() {
    let (server_url, state) = spawn_homeserver(valid_state()).await;
    let client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let room = client.create_private_chat("bob").await.expect("create chat");

    assert_eq!(room, "!created1:example.org");
    let state = state.lock().await;
    let (_, request) = &state.created[0];
    assert_eq!(request.name, None);
    assert_eq!(request.visibility, "private");
    assert!(request.is_direct);
    assert_eq!(request.invite, vec!["@bob:127.0.0.1"]);
}

#[tokio::test]
async fn create_room_with_rejected_token_is_unauthorized() {
    let (server_url, _state) = spawn_homeserver(MockState {
        valid_token: "someone-else".into(),
        ..MockState::default()
    })
    .await;
    let client = MatrixClient::for_dispatch(&config_for(&server_url)).expect("client");

    let err = client.create_private_chat("bob").await.expect_err("must fail");
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn unreachable_homeserver_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut client =
        MatrixClient::for_dispatch(&config_for(&format!("http://{addr}"))).expect("client");
    let err = client.send_to_target("help").await.expect_err("must fail");
    assert!(matches!(err, MatrixError::Unreachable(_)));
}
