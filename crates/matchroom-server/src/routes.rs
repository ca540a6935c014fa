use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use matchroom_gateway::GatewayState;
use matchroom_gateway::auth::{self, AdmissionError, Identity};
use matchroom_gateway::connection;
use matchroom_types::api::HealthResponse;
use matchroom_types::events::ServerEvent;

#[derive(Clone)]
pub struct ServerState {
    pub gateway: GatewayState,
    pub jwt_secret: Arc<str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Verify the credential presented with the upgrade request. The `token`
/// query parameter wins over an `Authorization: Bearer` header.
pub fn admit(
    query_token: Option<&str>,
    bearer: Option<&str>,
    jwt_secret: &str,
) -> Result<Identity, AdmissionError> {
    let token = query_token.filter(|t| !t.is_empty()).or(bearer);
    auth::verify_token(token, jwt_secret)
}

/// Token from an `Authorization: Bearer <token>` header. Any other scheme
/// counts as no header at all.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// A refused admission: `401` with the `AdmissionRejected` event as body.
pub fn rejection(err: &AdmissionError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ServerEvent::AdmissionRejected {
            reason: err.to_string(),
        }),
    )
        .into_response()
}

pub async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match admit(query.token.as_deref(), bearer_token(&headers), &state.jwt_secret) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Gateway admission refused: {}", e);
            return rejection(&e);
        }
    };

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway, identity))
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
