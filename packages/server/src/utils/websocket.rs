use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::models::{event::Audience, role::Team};
use crate::routes::game::ViewerQuery;
use crate::services::session_actor::SessionHandle;
use crate::state::AppState;

pub async fn handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, viewer.player_id))
}

/// Streams the room's game events to one client. Without a `player_id` only
/// public events are sent.
pub async fn handle_socket(
    ws: WebSocket,
    state: AppState,
    room_id: String,
    player_id: Option<String>,
) {
    let (mut sender, mut receiver) = ws.split();

    let handle = match state.sessions.get(&room_id).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Refusing WebSocket for room {}: {}", room_id, e);
            let error = serde_json::json!({
                "message_type": "error",
                "room_id": room_id,
                "content": e.to_string(),
            });
            let _ = sender.send(Message::Text(error.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!(
        "New WebSocket connection for room {} (player {:?})",
        room_id, player_id
    );

    let team = match &player_id {
        Some(id) => team_of(&handle, id).await,
        None => None,
    };
    let mut rx = match handle.subscribe().await {
        Ok(rx) => rx,
        Err(e) => {
            warn!("Cannot subscribe to room {}: {}", room_id, e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    // ハンドルを持ち続けるとルーム削除後もセッションが止まらない
    drop(handle);
    let room_id_for_send = room_id.clone();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "WebSocket in room {} lagged, skipped {} events",
                        room_id_for_send, skipped
                    );
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let visible = match &player_id {
                Some(id) => event.visible_to(id, team),
                None => event.audience == Audience::All,
            };
            if !visible {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize event for room {}: {}", room_id_for_send, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // クライアントからの入力はHTTP経由なので、ここでは切断だけを見る
    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }
    info!("WebSocket connection for room {} closed", room_id);
}

async fn team_of(handle: &SessionHandle, player_id: &str) -> Option<Team> {
    let view = handle.state(Some(player_id)).await.ok()?;
    view.players
        .iter()
        .find(|p| p.id == player_id)
        .and_then(|p| p.role)
        .map(|role| role.team())
}
