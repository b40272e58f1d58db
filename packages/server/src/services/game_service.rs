use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    models::{
        event::GameStateView,
        game::GamePhase,
        room::RoomStatus,
        role::ActionKind,
        vote::VoteTarget,
    },
    services::session_actor::SessionError,
    state::AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightActionRequest {
    pub player_id: String,
    pub target_id: String,
    pub action: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub voter_id: String,
    // 省略すると棄権
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub phase: GamePhase,
}

/// Deals roles to the room's players and starts the game.
pub async fn start_game(state: AppState, room_id: &str) -> Result<String, SessionError> {
    let mut rooms = state.rooms.lock().await;
    let room = rooms
        .get_mut(room_id)
        .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))?;
    if room.status == RoomStatus::InProgress {
        if let Ok(running) = state.sessions.get(room_id).await {
            if running.state(None).await?.phase != GamePhase::GameOver {
                return Err(SessionError::AlreadyExists(room_id.to_string()));
            }
        }
    }

    // 前回のゲームが終わっていれば片付けてから作り直す
    state.sessions.remove(room_id).await;
    let handle = state
        .sessions
        .create(room_id, &room.players, state.session_options())
        .await?;
    handle.start().await?;
    room.status = RoomStatus::InProgress;

    info!("Game started in room {} with {} players", room_id, room.players.len());
    Ok("Game started successfully".to_string())
}

pub async fn get_game_state(
    state: AppState,
    room_id: &str,
    viewer: Option<&str>,
) -> Result<GameStateView, SessionError> {
    state.sessions.get(room_id).await?.state(viewer).await
}

pub async fn process_night_action(
    state: AppState,
    room_id: &str,
    request: NightActionRequest,
) -> Result<bool, SessionError> {
    state
        .sessions
        .get(room_id)
        .await?
        .submit_night_action(&request.player_id, &request.target_id, request.action)
        .await
}

pub async fn handle_vote(
    state: AppState,
    room_id: &str,
    request: VoteRequest,
) -> Result<bool, SessionError> {
    let target = match request.target_id {
        Some(target_id) => VoteTarget::Player(target_id),
        None => VoteTarget::Abstain,
    };
    state
        .sessions
        .get(room_id)
        .await?
        .submit_vote(&request.voter_id, target)
        .await
}

// 議論を打ち切って投票へ進める
pub async fn force_voting(state: AppState, room_id: &str) -> Result<bool, SessionError> {
    state.sessions.get(room_id).await?.force_to_voting().await
}

/// Manual phase change, checked against the transition table like any other.
pub async fn transition(
    state: AppState,
    room_id: &str,
    request: TransitionRequest,
) -> Result<bool, SessionError> {
    info!("Manual transition to {} requested in room {}", request.phase, room_id);
    state
        .sessions
        .get(room_id)
        .await?
        .transition_to(request.phase)
        .await
}

pub async fn end_game(state: AppState, room_id: &str) -> Result<String, SessionError> {
    let handle = state.sessions.get(room_id).await?;
    let ended = handle.end().await?;

    if let Some(room) = state.rooms.lock().await.get_mut(room_id) {
        room.status = RoomStatus::Closed;
    }
    if ended {
        Ok("Game ended successfully".to_string())
    } else {
        Ok("Game was already over".to_string())
    }
}
