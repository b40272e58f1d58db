use dotenvy::dotenv;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn setup_test_env() {
    INIT.call_once(|| {
        dotenv().ok();
        // テスト中はカウントダウン通知を止め、役職の配布を固定する
        if std::env::var("GAME_TICK_SECONDS").is_err() {
            std::env::set_var("GAME_TICK_SECONDS", "0");
        }
        if std::env::var("GAME_RNG_SEED").is_err() {
            std::env::set_var("GAME_RNG_SEED", "42");
        }
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
