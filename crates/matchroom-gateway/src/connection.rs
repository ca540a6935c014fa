use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use matchroom_types::channels::Channel;
use matchroom_types::events::{ClientCommand, ServerEvent, UserRef};
use matchroom_types::models::ChatMessage;

use crate::auth::Identity;
use crate::dispatcher::Fanout;
use crate::membership::Membership;
use crate::pipeline::SendError;
use crate::state::GatewayState;

/// Default heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type SharedMembership = Arc<RwLock<Membership>>;

/// Counts heartbeat ticks that went by without a Pong.
#[derive(Debug, Default)]
struct Heartbeat {
    missed: u8,
}

impl Heartbeat {
    const MAX_MISSED: u8 = 2;

    /// Record one tick. Returns `false` once the peer has missed too many Pongs.
    fn tick(&mut self, pong_seen: bool) -> bool {
        if pong_seen {
            self.missed = 0;
        } else {
            self.missed += 1;
        }
        self.missed < Self::MAX_MISSED
    }
}

/// Next item off the fanout bus. A lagging receiver skips what it missed and
/// keeps going; `None` once the bus is gone.
async fn next_fanout(rx: &mut broadcast::Receiver<Fanout>, conn_id: Uuid) -> Option<Fanout> {
    loop {
        match rx.recv().await {
            Ok(fanout) => return Some(fanout),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Fanout receiver lagged by {} messages [conn={}]", n, conn_id);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Handle an admitted WebSocket connection. The credential was verified at the
/// HTTP upgrade, so the identity is fixed for the whole session.
pub async fn handle_connection(socket: WebSocket, state: GatewayState, identity: Identity) {
    let conn_id = Uuid::new_v4();
    let (mut sender, receiver) = socket.split();

    // Subscribe before Ready: anything published after the client sees Ready
    // reaches this connection.
    let fanout_rx = state.dispatcher.subscribe();
    let membership: SharedMembership = Arc::new(RwLock::new(Membership::admit(identity.user_id)));

    info!(
        "User {} connected to gateway [conn={}] ({} live connections)",
        identity.user_id,
        conn_id,
        state.dispatcher.connection_count()
    );

    let ready = ServerEvent::Ready {
        user_id: identity.user_id,
        email: identity.email.clone(),
    };
    let Some(text) = encode(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    let user_id = identity.user_id;
    run_connection_loop(sender, receiver, fanout_rx, state, identity, membership, conn_id).await;

    // Membership goes away with the connection; nothing else to clean up
    info!("User {} disconnected from gateway [conn={}]", user_id, conn_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut fanout_rx: broadcast::Receiver<Fanout>,
    state: GatewayState,
    identity: Identity,
    membership: SharedMembership,
    conn_id: Uuid,
) {
    // Events addressed to this connection only (history replies)
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let send_membership = membership.clone();
    let recv_membership = membership;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;
    let heartbeat_interval = state.heartbeat_interval;

    // Forward fanout + direct events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await;
        let mut heartbeat = Heartbeat::default();

        loop {
            tokio::select! {
                fanout = next_fanout(&mut fanout_rx, conn_id) => {
                    let Some(fanout) = fanout else { break };

                    let wanted = {
                        let subs = send_membership.read().unwrap_or_else(PoisonError::into_inner);
                        subs.accepts(&fanout)
                    };
                    if !wanted {
                        continue;
                    }

                    if sender.send(Message::Text(fanout.json.to_string().into())).await.is_err() {
                        break;
                    }
                }
                event = direct_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(text) = encode(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !heartbeat.tick(pong_flag_send.swap(false, Ordering::Acquire)) {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection [conn={}]", heartbeat.missed, conn_id);
                        break;
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(text.as_str()) {
                    Ok(cmd) => {
                        handle_command(&state, &identity, &recv_membership, &direct_tx, cmd).await;
                    }
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(200).collect();
                        warn!("User {} bad command: {} -- raw: {}", identity.user_id, e, raw);
                    }
                },
                Message::Binary(data) => {
                    warn!("User {} sent unsupported binary frame ({} bytes)", identity.user_id, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(
    state: &GatewayState,
    identity: &Identity,
    membership: &SharedMembership,
    direct_tx: &mpsc::UnboundedSender<ServerEvent>,
    cmd: ClientCommand,
) {
    let user_id = identity.user_id;

    match cmd {
        ClientCommand::Join { other_user_id } => {
            // Malformed or self-referential targets are a tolerated no-op
            let Some(other) = other_user_id.as_ref().and_then(UserRef::user_id) else {
                debug!("User {} join ignored: bad target {:?}", user_id, other_user_id);
                return;
            };
            let joined = {
                let mut subs = membership.write().unwrap_or_else(PoisonError::into_inner);
                subs.join_conversation(other).map(|key| (key, subs.channel_count()))
            };
            let Some((key, channels)) = joined else {
                debug!("User {} join ignored: cannot join own conversation", user_id);
                return;
            };

            info!("User {} joined {} ({} channels on this connection)", user_id, Channel::Conversation(key), channels);

            match state.history.load(key).await {
                Ok(messages) => {
                    let event = ServerEvent::History {
                        other_user_id: other,
                        messages: messages.iter().map(ChatMessage::to_wire).collect(),
                    };
                    let _ = direct_tx.send(event);
                }
                Err(e) => {
                    error!("User {} history load for {} failed: {:#}", user_id, Channel::Conversation(key), e);
                }
            }
        }

        ClientCommand::Send { to, text } => {
            match state.pipeline.send(user_id, to.as_ref(), &text).await {
                Ok(_) => {}
                Err(SendError::Validation(e)) => {
                    debug!("User {} send dropped: {}", user_id, e);
                }
                Err(e) => {
                    error!("User {} send dropped: {}", user_id, e);
                }
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    serde_json::to_string(event)
        .map_err(|e| error!("Failed to encode gateway event: {}", e))
        .ok()
}
