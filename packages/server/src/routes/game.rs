use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::{
    services::{
        game_service::{self, NightActionRequest, TransitionRequest, VoteRequest},
        session_actor::SessionError,
    },
    utils::websocket,
};

#[derive(Debug, Default, Deserialize)]
pub struct ViewerQuery {
    pub player_id: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest(
            "/:roomid",
            Router::new()
                // ゲームの基本操作
                .route("/start", post(start_game))
                .route("/end", post(end_game_handler))
                .route("/state", get(get_game_state))
                // ゲームアクション
                .nest(
                    "/actions",
                    Router::new()
                        .route("/vote", post(cast_vote_handler))
                        .route("/night-action", post(night_action_handler)),
                )
                // ゲーム進行の管理
                .route("/phase", post(transition_handler))
                .route("/phase/voting", post(force_voting_handler))
                // イベント配信
                // websocat "ws://localhost:8080/api/game/{roomid}/ws?player_id=1"
                .route("/ws", get(websocket::handler)),
        )
        .with_state(state)
}

fn error_response(error: SessionError) -> Response {
    let status = match &error {
        SessionError::RoomNotFound(_) | SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
        SessionError::Distribution(_) => StatusCode::BAD_REQUEST,
        SessionError::Closed(_) => StatusCode::GONE,
    };
    (status, Json(error.to_string())).into_response()
}

fn accepted_response(accepted: bool, what: &str) -> Response {
    if accepted {
        (StatusCode::OK, Json(format!("{} accepted", what))).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(format!("{} rejected", what))).into_response()
    }
}

pub async fn start_game(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    match game_service::start_game(state, &room_id).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_game_state(
    Path(room_id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
    State(state): State<AppState>,
) -> Response {
    match game_service::get_game_state(state, &room_id, viewer.player_id.as_deref()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn end_game_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    match game_service::end_game(state, &room_id).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn night_action_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(action_req): Json<NightActionRequest>,
) -> Response {
    match game_service::process_night_action(state, &room_id, action_req).await {
        Ok(accepted) => accepted_response(accepted, "Night action"),
        Err(e) => error_response(e),
    }
}

async fn cast_vote_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(vote_req): Json<VoteRequest>,
) -> Response {
    match game_service::handle_vote(state, &room_id, vote_req).await {
        Ok(accepted) => accepted_response(accepted, "Vote"),
        Err(e) => error_response(e),
    }
}

async fn force_voting_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    match game_service::force_voting(state, &room_id).await {
        Ok(moved) => accepted_response(moved, "Phase change"),
        Err(e) => error_response(e),
    }
}

async fn transition_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(transition_req): Json<TransitionRequest>,
) -> Response {
    match game_service::transition(state, &room_id, transition_req).await {
        Ok(moved) => accepted_response(moved, "Phase change"),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{config::GameConfig, event::GameStateView, game::GamePhase};
    use crate::services::room_service;
    use crate::utils::test_setup::setup_test_env;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt;

    async fn room_with_players(state: &AppState, n: usize) -> String {
        let room_id = room_service::create_room(state.clone()).await.to_string();
        for i in 1..=n {
            assert!(room_service::join_room(state.clone(), &room_id, &i.to_string()).await);
        }
        room_id
    }

    fn test_state() -> AppState {
        setup_test_env();
        AppState::with_config(GameConfig {
            rng_seed: Some(7),
            ..GameConfig::default()
        })
    }

    #[tokio::test]
    async fn test_start_game() {
        let state = test_state();
        let app = routes(state.clone());
        let room_id = room_with_players(&state, 5).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/{}/start", room_id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_start_game_with_too_few_players() {
        let state = test_state();
        let app = routes(state.clone());
        let room_id = room_with_players(&state, 3).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/{}/start", room_id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_state_of_unknown_game() {
        let state = test_state();
        let app = routes(state);

        let request = Request::builder()
            .uri("/42/state")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_state_hides_other_roles_from_a_player() {
        let state = AppState::with_config(GameConfig {
            reveal_roles: false,
            ..GameConfig::default()
        });
        let app = routes(state.clone());
        let room_id = room_with_players(&state, 5).await;
        game_service::start_game(state.clone(), &room_id).await.unwrap();

        let request = Request::builder()
            .uri(format!("/{}/state?player_id=1", room_id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let view: GameStateView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.phase, GamePhase::RoleReveal);
        assert!(view.players.iter().find(|p| p.id == "1").unwrap().role.is_some());
        // 5人なら人狼は1人なので、見えるのは自分の役職だけ
        let visible = view.players.iter().filter(|p| p.role.is_some()).count();
        assert_eq!(visible, 1);
    }

    #[tokio::test]
    async fn test_vote_outside_voting_is_rejected() {
        let state = test_state();
        let app = routes(state.clone());
        let room_id = room_with_players(&state, 5).await;
        game_service::start_game(state.clone(), &room_id).await.unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/{}/actions/vote", room_id))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"voter_id":"1","target_id":"2"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_manual_phase_change() {
        let state = test_state();
        let room_id = room_with_players(&state, 5).await;
        game_service::start_game(state.clone(), &room_id).await.unwrap();

        let phase_request = |body: &'static str| {
            Request::builder()
                .method("POST")
                .uri(format!("/{}/phase", room_id))
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        // 役職確認から投票へは飛べない
        let response = routes(state.clone())
            .oneshot(phase_request(r#"{"phase":"Voting"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = routes(state.clone())
            .oneshot(phase_request(r#"{"phase":"Night"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let view = game_service::get_game_state(state, &room_id, None)
            .await
            .unwrap();
        assert_eq!(view.phase, GamePhase::WerewolfKill);
        assert_eq!(view.day, 1);
    }

    #[tokio::test]
    async fn test_end_game() {
        let state = test_state();
        let app = routes(state.clone());
        let room_id = room_with_players(&state, 5).await;

        game_service::start_game(state.clone(), &room_id)
            .await
            .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/{}/end", room_id))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let view = game_service::get_game_state(state, &room_id, None)
            .await
            .unwrap();
        assert_eq!(view.phase, GamePhase::GameOver);
    }
}
