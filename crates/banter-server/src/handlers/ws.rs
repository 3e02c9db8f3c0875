//! WebSocket endpoints for real-time messaging and online tracking.
//!
//! Channel mode attaches a session to a channel room and announces
//! presence changes; peer mode attaches a session to the user's own inbox.
//! Authorization failures at connect time are rejected before the upgrade
//! with HTTP 403, so clients can tell "not authorized" from "server
//! error".

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::metrics::{self, ConnectionMetricsGuard};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use banter_core::{MembershipGate, RouteOutcome, RoutingKey, Session};
use banter_protocol::ServerFrame;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Close code for a send-time authorization denial (policy 403 analog).
const CLOSE_UNAUTHORIZED: u16 = 4403;

/// WebSocket endpoint for real-time channel messaging.
///
/// Membership is enforced before the upgrade; non-members never register
/// presence.
pub async fn channel_ws(
    State(state): State<Arc<AppState>>,
    Path((channel_id, user_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    let key = RoutingKey::channel(&channel_id);
    match state.store.is_authorized(&user_id, &key).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(user = %user_id, channel = %channel_id, "rejected non-member connect");
            return (StatusCode::FORBIDDEN, "Not a member of this channel").into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| run_session(socket, state, user_id, key))
}

/// WebSocket endpoint for peer-to-peer messaging.
pub async fn peer_ws(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.store.user_by_id(&user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(user = %user_id, "rejected unknown-user connect");
            return (StatusCode::FORBIDDEN, "Unknown user").into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    }

    let key = RoutingKey::peer(&user_id);
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| run_session(socket, state, user_id, key))
}

/// Drive one connection from registration to teardown.
///
/// The session is registered on entry and torn down by its own `Drop` on
/// every exit path, so a fault mid-frame can never leak a registry entry.
async fn run_session(socket: WebSocket, state: Arc<AppState>, user_id: String, key: RoutingKey) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut session, mut outbound) = Session::connect(Arc::clone(&state.registry), user_id, key);
    session.open();
    metrics::set_active_keys(state.registry.stats().key_count);

    if session.is_channel_mode() {
        // Announce the join to the whole room, joiner included.
        let online: Vec<String> = state
            .registry
            .members_of(session.origin())
            .into_iter()
            .collect();
        state.router.broadcaster().broadcast(
            session.origin(),
            &ServerFrame::user_joined(session.user_id().to_string(), online),
        );
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Frames queued for this connection, in broadcast order.
            Some(payload) = outbound.recv() => {
                metrics::record_message(payload.len(), "outbound");
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        let outcome = state.router.route(&session, &text).await;
                        if outcome == RouteOutcome::CloseUnauthorized {
                            let close = CloseFrame {
                                code: CLOSE_UNAUTHORIZED,
                                reason: "Not a member of this channel".into(),
                            };
                            let _ = sink.send(Message::Close(Some(close))).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(connection = %session.id(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %session.id(), "received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %session.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %session.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Teardown: unregister everywhere and announce the departure.
    drop(session);
    metrics::set_active_keys(state.registry.stats().key_count);
}
