use axum::http::{self, HeaderValue, Method};
use dotenvy::dotenv;
use env_logger::Builder;
use log::LevelFilter;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use server::{
    app,
    models::config::GameConfig,
    services::audit::FileSnapshotStore,
    state::AppState,
    utils::config::ServerConfig,
};

// ログ設定
fn init_logger() {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter_module("server", LevelFilter::Debug)
        .filter_module("audit", LevelFilter::Info)
        .filter_module("tower_http", LevelFilter::Debug)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .format_target(true)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 環境変数をロード
    if let Err(e) = dotenv() {
        eprintln!("Warning: .envファイルの読み込みに失敗しました: {}", e);
    }

    init_logger(); // ロガーの初期化

    let server_config = ServerConfig::from_env()?;
    let game_config = GameConfig::from_env();
    log::info!("Game config: {:?}", game_config);

    let mut state = AppState::with_config(game_config);
    if let Some(dir) = &server_config.snapshot_dir {
        log::info!("Writing session snapshots to {}", dir);
        state = state.with_snapshot_store(Arc::new(FileSnapshotStore::new(dir)));
    }

    // CORSレイヤーの設定
    let origin = server_config.cors_origin.parse::<HeaderValue>()?;
    let cors = CorsLayer::new()
        .allow_origin([origin])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([http::header::CONTENT_TYPE]);

    // ルーティングの設定
    let app = app::create_app_with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http() // HTTPトレースログを有効化
                .make_span_with(|request: &http::Request<_>| {
                    tracing::info_span!(
                        "HTTP request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }),
        );

    // サーバーの起動
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;
    println!("サーバーを起動しました: http://{}", server_config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
