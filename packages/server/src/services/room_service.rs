use std::collections::HashMap;
use tracing::info;

use crate::{
    models::{
        player::Seat,
        room::{Room, RoomStatus},
    },
    state::AppState,
};

pub async fn create_room(state: AppState) -> u32 {
    let mut rooms = state.rooms.lock().await;
    let new_id = rooms
        .keys()
        .filter_map(|k| k.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let new_room = Room::new(new_id.to_string(), None, None);
    rooms.insert(new_id.to_string(), new_room);
    info!("Created room {}", new_id);
    new_id
}

pub async fn join_room(state: AppState, room_id: &str, player_id: &str) -> bool {
    let mut rooms = state.rooms.lock().await;

    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    // ルームの状態がOpenか確認
    if room.status != RoomStatus::Open {
        return false;
    }
    if room.is_full() {
        return false;
    }
    // 既に参加しているプレイヤーかチェック
    if room.players.iter().any(|p| p.id == player_id) {
        return false;
    }

    room.players
        .push(Seat::new(player_id, format!("Player {}", player_id)));
    true
}

pub async fn leave_room(state: AppState, room_id: &str, player_id: &str) -> bool {
    let mut rooms = state.rooms.lock().await;

    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    // ゲーム開始後の離脱は受け付けない
    if room.status != RoomStatus::Open {
        return false;
    }
    match room.players.iter().position(|p| p.id == player_id) {
        Some(index) => {
            room.players.remove(index);
            true
        }
        None => false,
    }
}

pub async fn get_rooms(state: &AppState) -> HashMap<String, Room> {
    state.rooms.lock().await.clone()
}

pub async fn get_room_info(state: &AppState, room_id: &str) -> Option<Room> {
    state.rooms.lock().await.get(room_id).cloned()
}

pub async fn delete_room(state: AppState, room_id: &str) -> bool {
    let removed = state.rooms.lock().await.remove(room_id).is_some();
    if removed {
        state.sessions.remove(room_id).await;
    }
    removed
}
