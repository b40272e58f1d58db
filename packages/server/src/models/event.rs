use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    game::{GamePhase, GameResult},
    night::{Death, DeathCause, InvestigationReport},
    player::PlayerId,
    role::{ActionKind, Role, Team},
};

/// Who may see an event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Audience {
    All,
    Players(Vec<PlayerId>),
    Team(Team),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum GameEvent {
    PhaseChange {
        from_phase: GamePhase,
        to_phase: GamePhase,
        day: u32,
        remaining_seconds: Option<u64>,
    },
    TimerTick {
        phase: GamePhase,
        remaining_seconds: u64,
    },
    RoleTimerTick {
        role: Role,
        phase: GamePhase,
        remaining_seconds: u64,
    },
    ActionRequired {
        role: Role,
        action: ActionKind,
        remaining_seconds: u64,
        targets: Vec<PlayerId>,
    },
    /// Current kill votes, shown to the werewolf team only.
    KillVoteUpdate {
        votes: Vec<(PlayerId, PlayerId)>,
    },
    InvestigationResult {
        report: InvestigationReport,
    },
    NightResult {
        night: u32,
        was_saved: bool,
        deaths: Vec<Death>,
        saves: Vec<PlayerId>,
    },
    VoteUpdate {
        day: u32,
        tally: Vec<(PlayerId, usize)>,
        votes_cast: usize,
    },
    PlayerEliminated {
        player_id: PlayerId,
        role: Role,
        cause: DeathCause,
    },
    GameEnd {
        result: GameResult,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub session_id: String,
    pub audience: Audience,
    pub event: GameEvent,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Whether `player` (with `team`) may receive this event.
    pub fn visible_to(&self, player: &str, team: Option<Team>) -> bool {
        match &self.audience {
            Audience::All => true,
            Audience::Players(ids) => ids.iter().any(|id| id == player),
            Audience::Team(t) => team == Some(*t),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub is_dead: bool,
    pub role: Option<Role>,
}

/// Read-only snapshot returned by `get_state`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameStateView {
    pub session_id: String,
    pub phase: GamePhase,
    pub day: u32,
    pub remaining_seconds: Option<u64>,
    pub players: Vec<PlayerView>,
    pub alive: Vec<PlayerId>,
    pub dead: Vec<PlayerId>,
    pub legal_targets: Vec<PlayerId>,
    pub vote_tally: Vec<(PlayerId, usize)>,
    pub eliminated_today: Option<PlayerId>,
    pub result: Option<GameResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_message_type() {
        let event = GameEvent::TimerTick {
            phase: GamePhase::Voting,
            remaining_seconds: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message_type"], "timer_tick");
        assert_eq!(json["phase"], "Voting");
        assert_eq!(json["remaining_seconds"], 12);
    }

    #[test]
    fn test_audience_filtering() {
        let event = SessionEvent {
            session_id: "1".to_string(),
            audience: Audience::Team(Team::Werewolf),
            event: GameEvent::TimerTick {
                phase: GamePhase::WerewolfKill,
                remaining_seconds: 3,
            },
            timestamp: Utc::now(),
        };
        assert!(event.visible_to("w", Some(Team::Werewolf)));
        assert!(!event.visible_to("v", Some(Team::Village)));
        assert!(!event.visible_to("spectator", None));
    }
}
