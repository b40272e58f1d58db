use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::game::GamePhase;

/// How a tie at the top of the day vote is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    NoElimination,
    Random,
    // 再投票は未実装のため、このラウンドは誰も処刑しない
    Revote,
}

impl TieBreakPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "no_elimination" => Some(Self::NoElimination),
            "random" => Some(Self::Random),
            "revote" => Some(Self::Revote),
            _ => None,
        }
    }
}

/// Per-session game settings. Built once when the session is created and
/// never merged again afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub role_reveal_seconds: u64,
    pub werewolf_seconds: u64,
    pub doctor_seconds: u64,
    pub seer_seconds: u64,
    pub sorceress_seconds: u64,
    pub vigilante_seconds: u64,
    pub discussion_seconds: u64,
    pub voting_seconds: u64,
    pub resolution_seconds: u64,
    // 0 にするとカウントダウン通知を送らない
    pub tick_seconds: u64,
    pub tie_break: TieBreakPolicy,
    pub enable_seer: bool,
    pub enable_doctor: bool,
    pub enable_vigilante: bool,
    pub enable_sorceress: bool,
    pub enable_jester: bool,
    pub min_players: usize,
    pub neutral_min_players: usize,
    pub rng_seed: Option<u64>,
    // 生存者の役職も状態取得で返すかどうか
    pub reveal_roles: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            role_reveal_seconds: 10,
            werewolf_seconds: 30,
            doctor_seconds: 20,
            seer_seconds: 20,
            sorceress_seconds: 20,
            vigilante_seconds: 20,
            discussion_seconds: 120,
            voting_seconds: 60,
            resolution_seconds: 5,
            tick_seconds: 1,
            tie_break: TieBreakPolicy::NoElimination,
            enable_seer: true,
            enable_doctor: true,
            enable_vigilante: false,
            enable_sorceress: false,
            enable_jester: false,
            min_players: 5,
            neutral_min_players: 8,
            rng_seed: None,
            reveal_roles: cfg!(debug_assertions),
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            role_reveal_seconds: env_u64("GAME_ROLE_REVEAL_SECONDS", defaults.role_reveal_seconds),
            werewolf_seconds: env_u64("GAME_WEREWOLF_SECONDS", defaults.werewolf_seconds),
            doctor_seconds: env_u64("GAME_DOCTOR_SECONDS", defaults.doctor_seconds),
            seer_seconds: env_u64("GAME_SEER_SECONDS", defaults.seer_seconds),
            sorceress_seconds: env_u64("GAME_SORCERESS_SECONDS", defaults.sorceress_seconds),
            vigilante_seconds: env_u64("GAME_VIGILANTE_SECONDS", defaults.vigilante_seconds),
            discussion_seconds: env_u64("GAME_DISCUSSION_SECONDS", defaults.discussion_seconds),
            voting_seconds: env_u64("GAME_VOTING_SECONDS", defaults.voting_seconds),
            resolution_seconds: env_u64("GAME_RESOLUTION_SECONDS", defaults.resolution_seconds),
            tick_seconds: env_u64("GAME_TICK_SECONDS", defaults.tick_seconds),
            tie_break: env::var("GAME_TIE_BREAK")
                .ok()
                .and_then(|v| TieBreakPolicy::parse(&v))
                .unwrap_or(defaults.tie_break),
            enable_seer: env_bool("GAME_ENABLE_SEER", defaults.enable_seer),
            enable_doctor: env_bool("GAME_ENABLE_DOCTOR", defaults.enable_doctor),
            enable_vigilante: env_bool("GAME_ENABLE_VIGILANTE", defaults.enable_vigilante),
            enable_sorceress: env_bool("GAME_ENABLE_SORCERESS", defaults.enable_sorceress),
            enable_jester: env_bool("GAME_ENABLE_JESTER", defaults.enable_jester),
            min_players: env_u64("GAME_MIN_PLAYERS", defaults.min_players as u64) as usize,
            neutral_min_players: env_u64(
                "GAME_NEUTRAL_MIN_PLAYERS",
                defaults.neutral_min_players as u64,
            ) as usize,
            rng_seed: env::var("GAME_RNG_SEED")
                .ok()
                .and_then(|v| v.parse::<u64>().ok()),
            reveal_roles: env_bool("GAME_REVEAL_ROLES", defaults.reveal_roles),
        }
    }

    /// Countdown for a phase, or `None` for phases that never time out.
    pub fn phase_duration(&self, phase: GamePhase) -> Option<Duration> {
        let seconds = match phase {
            GamePhase::RoleReveal => self.role_reveal_seconds,
            GamePhase::WerewolfKill => self.werewolf_seconds,
            GamePhase::Protector => self.doctor_seconds,
            GamePhase::Investigator => self.seer_seconds,
            GamePhase::Sorceress => self.sorceress_seconds,
            GamePhase::LimitedKiller => self.vigilante_seconds,
            GamePhase::DayDiscussion => self.discussion_seconds,
            GamePhase::Voting => self.voting_seconds,
            GamePhase::Resolution => self.resolution_seconds,
            GamePhase::Lobby | GamePhase::Night | GamePhase::GameOver => return None,
        };
        Some(Duration::from_secs(seconds))
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_seconds > 0).then(|| Duration::from_secs(self.tick_seconds))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map(|v| v == "true").unwrap_or(default)
}
