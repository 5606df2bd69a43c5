//! WebSocket endpoint for support chat and live notifications.
//!
//! Frames are JSON text `{"event": "...", "data": {...}}` in both
//! directions. The access token travels in `?token=` since browsers cannot
//! set headers on a WebSocket handshake.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::support::SendMessageRequest,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, authenticate},
    realtime::hub::{ConnectionId, SELLERS_ROOM, ServerEvent, conversation_room, user_room},
    services::support_service,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinSupportRoom { conversation_id: Uuid },
    LeaveSupportRoom { conversation_id: Uuid },
    SupportSendMessage { conversation_id: Uuid, content: String },
    SupportTyping {
        conversation_id: Uuid,
        #[serde(default = "default_typing")]
        typing: bool,
    },
    SupportMarkRead { conversation_id: Uuid },
    Ping,
}

fn default_typing() -> bool {
    true
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = query
        .token
        .or(header_token)
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;
    let user = authenticate(&state, &token)?;

    Ok(ws.on_upgrade(move |socket| run_connection(state, user, socket)))
}

async fn run_connection(state: AppState, user: AuthUser, socket: WebSocket) {
    let (conn, mut rx) = state.hub.connect().await;
    state.hub.join(conn, &user_room(user.user_id)).await;
    if user.is_seller() {
        state.hub.join(conn, SELLERS_ROOM).await;
    }
    tracing::debug!(%conn, user_id = %user.user_id, "websocket connected");

    state
        .hub
        .send_to(
            conn,
            ServerEvent::new(
                "connected",
                serde_json::json!({ "user_id": user.user_id, "role": user.role }),
            ),
        )
        .await;

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => handle_text(&recv_state, &user, conn, text.as_str()).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.disconnect(conn).await;
    tracing::debug!(%conn, "websocket disconnected");
}

async fn handle_text(state: &AppState, user: &AuthUser, conn: ConnectionId, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            state
                .hub
                .send_to(conn, ServerEvent::error(format!("invalid event: {err}")))
                .await;
            return;
        }
    };

    if let Err(err) = dispatch(state, user, conn, event).await {
        if err.status_code().is_server_error() {
            tracing::error!(error = ?err, "websocket event failed");
        }
        state
            .hub
            .send_to(conn, ServerEvent::error(err.public_message()))
            .await;
    }
}

async fn dispatch(
    state: &AppState,
    user: &AuthUser,
    conn: ConnectionId,
    event: ClientEvent,
) -> AppResult<()> {
    match event {
        ClientEvent::JoinSupportRoom { conversation_id } => {
            support_service::load_for(state, user, conversation_id).await?;
            state.hub.join(conn, &conversation_room(conversation_id)).await;
        }
        ClientEvent::LeaveSupportRoom { conversation_id } => {
            state.hub.leave(conn, &conversation_room(conversation_id)).await;
        }
        ClientEvent::SupportSendMessage {
            conversation_id,
            content,
        } => {
            let payload = SendMessageRequest { content };
            payload.validate()?;
            let message =
                support_service::send_message(state, user, conversation_id, &payload.content, Some(conn))
                    .await?;
            // The sender gets the stored message back as acknowledgement.
            state
                .hub
                .send_to(
                    conn,
                    ServerEvent::new(
                        support_service::NEW_MESSAGE_EVENT,
                        serde_json::json!({ "conversation_id": conversation_id, "message": message }),
                    ),
                )
                .await;
        }
        ClientEvent::SupportTyping {
            conversation_id,
            typing,
        } => {
            support_service::typing(state, user, conversation_id, typing, conn).await?;
        }
        ClientEvent::SupportMarkRead { conversation_id } => {
            support_service::mark_read(state, user, conversation_id, Some(conn)).await?;
        }
        ClientEvent::Ping => {
            state.hub.send_to(conn, ServerEvent::new("pong", ())).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_adjacently_tagged_events() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"event":"support_send_message","data":{{"conversation_id":"{id}","content":"Còn hàng không shop?"}}}}"#
        );
        assert_eq!(
            serde_json::from_str::<ClientEvent>(&raw).unwrap(),
            ClientEvent::SupportSendMessage {
                conversation_id: id,
                content: "Còn hàng không shop?".into(),
            }
        );
    }

    #[test]
    fn typing_defaults_to_true() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"event":"support_typing","data":{{"conversation_id":"{id}"}}}}"#);
        assert_eq!(
            serde_json::from_str::<ClientEvent>(&raw).unwrap(),
            ClientEvent::SupportTyping {
                conversation_id: id,
                typing: true,
            }
        );
    }

    #[test]
    fn ping_needs_no_data() {
        assert_eq!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"ping"}"#).unwrap(),
            ClientEvent::Ping
        );
    }

    #[test]
    fn unknown_events_are_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"drop_tables","data":{}}"#).is_err());
    }
}
