use std::sync::Arc;
use std::time::Duration;

use server::{
    models::{
        config::GameConfig,
        event::GameStateView,
        game::{GamePhase, Winner},
        player::Seat,
        role::{ActionKind, Role},
        room::{Room, RoomStatus},
    },
    services::{
        clock::ManualClock,
        game_service::{self, NightActionRequest, TransitionRequest, VoteRequest},
        session_actor::SessionError,
    },
    state::AppState,
    utils::test_setup::setup_test_env,
};

fn test_state(clock: Arc<ManualClock>) -> AppState {
    setup_test_env();
    AppState::with_config(GameConfig {
        tick_seconds: 0,
        rng_seed: Some(11),
        reveal_roles: true,
        ..GameConfig::default()
    })
    .with_clock(clock)
}

/// テスト用のルームにプレイヤーを追加
async fn setup_test_room_with_players(state: &AppState, n: usize) -> String {
    let room_id = "test_room".to_string();
    let mut room = Room::new(room_id.clone(), Some("Test Room".to_string()), Some(n));
    room.players = (1..=n)
        .map(|i| Seat::new(i.to_string(), format!("Player{}", i)))
        .collect();
    state.rooms.lock().await.insert(room_id.clone(), room);
    room_id
}

async fn game_state(state: &AppState, room_id: &str) -> GameStateView {
    game_service::get_game_state(state.clone(), room_id, None)
        .await
        .unwrap()
}

fn holders(view: &GameStateView, role: Role) -> Vec<String> {
    view.players
        .iter()
        .filter(|p| p.role == Some(role))
        .map(|p| p.id.clone())
        .collect()
}

async fn night_action(state: &AppState, room_id: &str, player: &str, target: &str, action: ActionKind) -> bool {
    game_service::process_night_action(
        state.clone(),
        room_id,
        NightActionRequest {
            player_id: player.to_string(),
            target_id: target.to_string(),
            action,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_game_start() {
    let clock = Arc::new(ManualClock::new());
    let state = test_state(clock);
    let room_id = setup_test_room_with_players(&state, 5).await;

    // ゲーム開始
    let start_result = game_service::start_game(state.clone(), &room_id).await;
    assert!(start_result.is_ok(), "ゲーム開始に失敗: {:?}", start_result);

    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::RoleReveal);
    assert_eq!(view.players.len(), 5);
    assert_eq!(holders(&view, Role::Werewolf).len(), 1);
    assert_eq!(holders(&view, Role::Seer).len(), 1);
    assert_eq!(holders(&view, Role::Doctor).len(), 1);
    assert_eq!(
        state.rooms.lock().await.get(&room_id).unwrap().status,
        RoomStatus::InProgress
    );

    // 進行中のゲームは二重に開始できない
    assert_eq!(
        game_service::start_game(state.clone(), &room_id).await,
        Err(SessionError::AlreadyExists(room_id.clone()))
    );
}

#[tokio::test]
async fn test_unknown_room() {
    let state = test_state(Arc::new(ManualClock::new()));
    assert_eq!(
        game_service::start_game(state.clone(), "nope").await,
        Err(SessionError::RoomNotFound("nope".to_string()))
    );
    assert_eq!(
        game_service::force_voting(state.clone(), "nope").await,
        Err(SessionError::NotFound("nope".to_string()))
    );
}

#[tokio::test]
async fn test_full_round_until_village_wins() {
    let clock = Arc::new(ManualClock::new());
    let state = test_state(clock.clone());
    let room_id = setup_test_room_with_players(&state, 5).await;
    game_service::start_game(state.clone(), &room_id)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10));
    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::WerewolfKill);

    let wolf = holders(&view, Role::Werewolf).remove(0);
    let seer = holders(&view, Role::Seer).remove(0);
    let doctor = holders(&view, Role::Doctor).remove(0);
    let victim = holders(&view, Role::Villager).remove(0);

    assert!(night_action(&state, &room_id, &wolf, &victim, ActionKind::Kill).await);
    assert_eq!(game_state(&state, &room_id).await.phase, GamePhase::Protector);
    assert!(night_action(&state, &room_id, &doctor, &seer, ActionKind::Protect).await);
    assert!(night_action(&state, &room_id, &seer, &wolf, ActionKind::Investigate).await);

    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::DayDiscussion);
    assert_eq!(view.dead, vec![victim.clone()]);

    assert!(game_service::force_voting(state.clone(), &room_id).await.unwrap());
    for voter in view.alive.iter().filter(|id| **id != wolf) {
        let accepted = game_service::handle_vote(
            state.clone(),
            &room_id,
            VoteRequest {
                voter_id: voter.clone(),
                target_id: Some(wolf.clone()),
            },
        )
        .await
        .unwrap();
        assert!(accepted);
    }
    // 人狼は棄権
    assert!(game_service::handle_vote(
        state.clone(),
        &room_id,
        VoteRequest {
            voter_id: wolf.clone(),
            target_id: None,
        },
    )
    .await
    .unwrap());

    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::Resolution);
    assert_eq!(view.eliminated_today, Some(wolf.clone()));
    assert_eq!(view.result.as_ref().unwrap().winner, Winner::Village);

    clock.advance(Duration::from_secs(5));
    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::GameOver);

    // 終わったゲームは同じルームで始め直せる
    assert!(game_service::start_game(state.clone(), &room_id).await.is_ok());
    assert_eq!(game_state(&state, &room_id).await.phase, GamePhase::RoleReveal);
}

#[tokio::test]
async fn test_transition_is_checked_against_the_table() {
    let state = test_state(Arc::new(ManualClock::new()));
    let room_id = setup_test_room_with_players(&state, 5).await;
    game_service::start_game(state.clone(), &room_id)
        .await
        .unwrap();

    let moved = game_service::transition(
        state.clone(),
        &room_id,
        TransitionRequest {
            phase: GamePhase::Voting,
        },
    )
    .await
    .unwrap();
    assert!(!moved);
    assert_eq!(game_state(&state, &room_id).await.phase, GamePhase::RoleReveal);
}

#[tokio::test]
async fn test_game_end() {
    let state = test_state(Arc::new(ManualClock::new()));
    let room_id = setup_test_room_with_players(&state, 6).await;

    // ゲーム開始
    game_service::start_game(state.clone(), &room_id)
        .await
        .unwrap();

    let message = game_service::end_game(state.clone(), &room_id).await.unwrap();
    assert_eq!(message, "Game ended successfully");

    let view = game_state(&state, &room_id).await;
    assert_eq!(view.phase, GamePhase::GameOver);
    assert_eq!(view.result.unwrap().winner, Winner::Aborted);
    assert_eq!(
        state.rooms.lock().await.get(&room_id).unwrap().status,
        RoomStatus::Closed
    );

    let again = game_service::end_game(state.clone(), &room_id).await.unwrap();
    assert_eq!(again, "Game was already over");
}
