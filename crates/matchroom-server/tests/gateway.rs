//! End-to-end gateway tests: a real server on a loopback port, real WebSocket
//! clients, and a SQLite message log in the temp dir.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use matchroom_db::Database;
use matchroom_gateway::GatewayState;
use matchroom_gateway::auth::issue_token;
use matchroom_gateway::history::HISTORY_LIMIT;
use matchroom_gateway::log::MessageLog;
use matchroom_server::routes::ServerState;
use matchroom_types::channels::ConversationKey;
use matchroom_types::events::{ClientCommand, ServerEvent, UserRef};
use matchroom_types::models::{ChatMessage, DirectMessage};

const SECRET: &str = "gateway-test-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    db: Arc<Database>,
    path: PathBuf,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(self.path.with_extension("db-wal"));
        let _ = std::fs::remove_file(self.path.with_extension("db-shm"));
    }
}

async fn spawn_server() -> TestServer {
    spawn_server_with(|gateway| gateway).await
}

async fn spawn_server_with(configure: impl FnOnce(GatewayState) -> GatewayState) -> TestServer {
    let path = std::env::temp_dir().join(format!("matchroom_gateway_test_{}.db", uuid::Uuid::new_v4()));
    let db = Arc::new(Database::open(&path).unwrap());

    let state = ServerState {
        gateway: configure(GatewayState::new(db.clone(), HISTORY_LIMIT)),
        jwt_secret: SECRET.into(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, matchroom_server::app(state)).await.unwrap();
    });

    TestServer { addr, db, path }
}

fn token_for(user_id: i64, ttl: chrono::Duration) -> String {
    issue_token(SECRET, user_id, &format!("user{}@example.com", user_id), ttl).unwrap()
}

async fn connect(server: &TestServer, user_id: i64) -> Client {
    let url = format!("ws://{}/gateway?token={}", server.addr, token_for(user_id, chrono::Duration::days(7)));
    let (mut ws, _) = connect_async(url).await.unwrap();

    match next_event(&mut ws).await {
        ServerEvent::Ready { user_id: id, email } => {
            assert_eq!(id, user_id);
            assert_eq!(email, format!("user{}@example.com", user_id));
        }
        other => panic!("expected Ready, got {:?}", other),
    }
    ws
}

async fn send_raw(ws: &mut Client, json: &str) {
    ws.send(Message::text(json.to_string())).await.unwrap();
}

async fn send_command(ws: &mut Client, cmd: &ClientCommand) {
    send_raw(ws, &serde_json::to_string(cmd).unwrap()).await;
}

async fn send_dm(ws: &mut Client, to: i64, text: &str) {
    send_command(
        ws,
        &ClientCommand::Send {
            to: Some(UserRef::Id(to)),
            text: text.to_string(),
        },
    )
    .await;
}

async fn join(ws: &mut Client, other: i64) -> Vec<DirectMessage> {
    send_command(
        ws,
        &ClientCommand::Join {
            other_user_id: Some(UserRef::Id(other)),
        },
    )
    .await;
    match next_event(ws).await {
        ServerEvent::History { other_user_id, messages } => {
            assert_eq!(other_user_id, other);
            messages
        }
        other => panic!("expected History, got {:?}", other),
    }
}

async fn next_event(ws: &mut Client) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_delivery(ws: &mut Client) -> DirectMessage {
    match next_event(ws).await {
        ServerEvent::MessageDelivered(msg) => msg,
        other => panic!("expected MessageDelivered, got {:?}", other),
    }
}

/// Nothing but control frames arrives for a short while.
async fn assert_silent(ws: &mut Client) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected event: {}", text.as_str()),
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("connection ended: {:?}", other),
        }
    }
}

async fn expect_refused(request: impl IntoClientRequest + Unpin) {
    match connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        Err(e) => panic!("expected HTTP 401, got {}", e),
        Ok(_) => panic!("connection should have been refused"),
    }
}

#[tokio::test]
async fn send_is_persisted_and_delivered_to_both_inboxes() {
    let server = spawn_server().await;
    let mut seven = connect(&server, 7).await;
    let mut three = connect(&server, 3).await;

    send_dm(&mut three, 7, "hi").await;

    let received = next_delivery(&mut seven).await;
    assert_eq!((received.from, received.to, received.text.as_str()), (3, 7, "hi"));

    // Persist-before-fanout: the live event implies the row exists
    let key = ConversationKey::new(3, 7).unwrap();
    let stored = server.db.recent_for_pair(key, HISTORY_LIMIT).unwrap();
    assert_eq!(stored, vec![ChatMessage::new(3, 7, "hi", received.ts).unwrap()]);

    // Sender's own inbox gets it too
    let echoed = next_delivery(&mut three).await;
    assert_eq!(echoed, received);

    // Joining afterwards returns the same message as backlog
    let history = join(&mut seven, 3).await;
    assert_eq!(history, vec![received]);
}

#[tokio::test]
async fn other_users_do_not_see_the_conversation() {
    let server = spawn_server().await;
    let mut seven = connect(&server, 7).await;
    let mut three = connect(&server, 3).await;
    let mut nine = connect(&server, 9).await;

    send_dm(&mut three, 7, "private").await;
    next_delivery(&mut seven).await;
    next_delivery(&mut three).await;

    assert_silent(&mut nine).await;
}

#[tokio::test]
async fn joined_sender_receives_own_message_once() {
    let server = spawn_server().await;
    let mut three = connect(&server, 3).await;

    // Subscribed to both dm:3:7 and user:3
    assert!(join(&mut three, 7).await.is_empty());
    send_dm(&mut three, 7, "once").await;

    assert_eq!(next_delivery(&mut three).await.text, "once");
    assert_silent(&mut three).await;
}

#[tokio::test]
async fn every_device_of_the_recipient_is_notified() {
    let server = spawn_server().await;
    let mut phone = connect(&server, 7).await;
    let mut laptop = connect(&server, 7).await;
    let mut three = connect(&server, 3).await;

    send_dm(&mut three, 7, "ping").await;

    assert_eq!(next_delivery(&mut phone).await.text, "ping");
    assert_eq!(next_delivery(&mut laptop).await.text, "ping");
}

#[tokio::test]
async fn invalid_sends_are_dropped_silently_and_connection_survives() {
    let server = spawn_server().await;
    let mut seven = connect(&server, 7).await;
    let mut three = connect(&server, 3).await;

    send_dm(&mut three, 7, "   \n\t").await;
    send_dm(&mut three, 3, "note to self").await;
    send_raw(&mut three, r#"{"type":"Send","data":{"to":"abc","text":"hi"}}"#).await;
    send_raw(&mut three, r#"{"type":"Send","data":{"to":0,"text":"hi"}}"#).await;
    send_raw(&mut three, r#"{"type":"Send","data":{"text":"hi"}}"#).await;
    send_raw(&mut three, "definitely not json").await;

    assert_silent(&mut three).await;
    assert_silent(&mut seven).await;
    assert_eq!(server.db.count_messages(3, 7).unwrap(), 0);

    // Still open: a valid send (numeric-string target) goes through, trimmed
    send_raw(&mut three, r#"{"type":"Send","data":{"to":"7","text":"  real one  "}}"#).await;
    assert_eq!(next_delivery(&mut seven).await.text, "real one");
    assert_eq!(server.db.count_messages(3, 7).unwrap(), 1);
}

#[tokio::test]
async fn malformed_or_self_join_is_ignored() {
    let server = spawn_server().await;
    let mut three = connect(&server, 3).await;

    send_command(&mut three, &ClientCommand::Join { other_user_id: Some(UserRef::Id(3)) }).await;
    send_command(&mut three, &ClientCommand::Join { other_user_id: None }).await;
    send_raw(&mut three, r#"{"type":"Join","data":{"other_user_id":"nobody"}}"#).await;
    assert_silent(&mut three).await;

    // A proper join still works on the same connection
    assert!(join(&mut three, 4).await.is_empty());
}

#[tokio::test]
async fn join_returns_most_recent_200_oldest_first() {
    let server = spawn_server().await;
    for i in 0..250 {
        let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
        server
            .db
            .append(&ChatMessage::new(from, to, format!("m{}", i), 1_000 + i).unwrap())
            .unwrap();
    }

    let mut two = connect(&server, 2).await;
    let history = join(&mut two, 1).await;

    assert_eq!(history.len(), 200);
    assert_eq!(history.first().unwrap().text, "m50");
    assert_eq!(history.last().unwrap().text, "m249");
    assert!(history.windows(2).all(|w| w[0].ts <= w[1].ts));
}

#[tokio::test]
async fn offline_recipient_finds_message_in_history() {
    let server = spawn_server().await;
    let mut three = connect(&server, 3).await;

    send_dm(&mut three, 7, "you there?").await;
    let sent = next_delivery(&mut three).await;

    let mut seven = connect(&server, 7).await;
    assert_eq!(join(&mut seven, 3).await, vec![sent]);
}

#[tokio::test]
async fn conversation_member_sees_messages_after_reconnect_and_join() {
    let server = spawn_server().await;
    let mut seven = connect(&server, 7).await;
    seven.close(None).await.unwrap();

    let mut three = connect(&server, 3).await;
    send_dm(&mut three, 7, "first").await;
    next_delivery(&mut three).await;

    let mut seven = connect(&server, 7).await;
    let history = join(&mut seven, 3).await;
    assert_eq!(history.len(), 1);

    send_dm(&mut three, 7, "second").await;
    assert_eq!(next_delivery(&mut seven).await.text, "second");
}

#[tokio::test]
async fn expired_credential_is_refused() {
    let server = spawn_server().await;
    let token = token_for(3, chrono::Duration::hours(-2));
    expect_refused(format!("ws://{}/gateway?token={}", server.addr, token)).await;
}

#[tokio::test]
async fn missing_or_forged_credential_is_refused() {
    let server = spawn_server().await;
    expect_refused(format!("ws://{}/gateway", server.addr)).await;

    let forged = issue_token("not-the-secret", 3, "x@example.com", chrono::Duration::days(1)).unwrap();
    expect_refused(format!("ws://{}/gateway?token={}", server.addr, forged)).await;
}

fn with_authorization(url: String, value: &str) -> tungstenite::handshake::client::Request {
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", value.parse().unwrap());
    request
}

/// Reads until the server ends the connection. Panics on application data.
async fn expect_closed_by_server(ws: &mut Client) {
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => panic!("unexpected event: {}", text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "server kept the connection open");
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let server = spawn_server().await;
    let bearer = format!("Bearer {}", token_for(5, chrono::Duration::days(1)));
    let request = with_authorization(format!("ws://{}/gateway", server.addr), &bearer);

    let (mut ws, _) = connect_async(request).await.unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Ready { user_id: 5, .. }));
}

#[tokio::test]
async fn query_token_wins_over_foreign_authorization_header() {
    let server = spawn_server().await;
    let url = format!("ws://{}/gateway?token={}", server.addr, token_for(4, chrono::Duration::days(1)));
    let request = with_authorization(url, "Basic Zm9vOmJhcg==");

    let (mut ws, _) = connect_async(request).await.unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Ready { user_id: 4, .. }));
}

#[tokio::test]
async fn foreign_authorization_scheme_alone_is_refused() {
    let server = spawn_server().await;
    let request = with_authorization(format!("ws://{}/gateway", server.addr), "Token abc");
    expect_refused(request).await;
}

#[tokio::test]
async fn unresponsive_client_is_dropped_after_missed_pongs() {
    let server = spawn_server_with(|gateway| gateway.with_heartbeat_interval(Duration::from_millis(200))).await;
    let mut silent = connect(&server, 9).await;
    let mut lively = connect(&server, 3).await;

    // Reading answers Pings; `silent` is left unpolled so its Pings go unanswered
    for _ in 0..4 {
        assert_silent(&mut lively).await;
    }

    expect_closed_by_server(&mut silent).await;

    send_dm(&mut lively, 7, "still here").await;
    assert_eq!(next_delivery(&mut lively).await.text, "still here");
}
