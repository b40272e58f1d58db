use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    night::{NightActionState, NightOutcome},
    player::{Player, PlayerId},
    role::{ActionKind, Role, Team},
    vote::VoteState,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GamePhase {
    Lobby,         // ゲーム開始前
    RoleReveal,    // 役職確認
    Night,         // 夜フェーズ（各役職のサブフェーズへ即座に進む）
    WerewolfKill,  // 人狼の襲撃
    Protector,     // 騎士の護衛
    Investigator,  // 占い師の占い
    Sorceress,     // 狂人の占い
    LimitedKiller, // 狩人の射撃
    DayDiscussion, // 議論フェーズ
    Voting,        // 投票フェーズ
    Resolution,    // 結果発表フェーズ
    GameOver,      // ゲーム終了
}

/// Night sub-phases in the order they are played.
pub const NIGHT_ORDER: [GamePhase; 5] = [
    GamePhase::WerewolfKill,
    GamePhase::Protector,
    GamePhase::Investigator,
    GamePhase::Sorceress,
    GamePhase::LimitedKiller,
];

// サブフェーズからは後ろのサブフェーズにしか進めない
static NIGHT_SUCCESSORS: [GamePhase; 7] = [
    GamePhase::WerewolfKill,
    GamePhase::Protector,
    GamePhase::Investigator,
    GamePhase::Sorceress,
    GamePhase::LimitedKiller,
    GamePhase::DayDiscussion,
    GamePhase::GameOver,
];

impl GamePhase {
    /// Legal successors of this phase. `GameOver` has none.
    pub fn successors(&self) -> &'static [GamePhase] {
        match self {
            GamePhase::Lobby => &[GamePhase::RoleReveal],
            GamePhase::RoleReveal => &[GamePhase::Night, GamePhase::GameOver],
            GamePhase::Night => &NIGHT_SUCCESSORS,
            GamePhase::WerewolfKill => &NIGHT_SUCCESSORS[1..],
            GamePhase::Protector => &NIGHT_SUCCESSORS[2..],
            GamePhase::Investigator => &NIGHT_SUCCESSORS[3..],
            GamePhase::Sorceress => &NIGHT_SUCCESSORS[4..],
            GamePhase::LimitedKiller => &NIGHT_SUCCESSORS[5..],
            GamePhase::DayDiscussion => &[GamePhase::Voting, GamePhase::GameOver],
            GamePhase::Voting => &[GamePhase::Resolution, GamePhase::GameOver],
            GamePhase::Resolution => &[GamePhase::Night, GamePhase::GameOver],
            GamePhase::GameOver => &[],
        }
    }

    pub fn can_transition_to(&self, next: GamePhase) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_night_subphase(&self) -> bool {
        NIGHT_ORDER.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        *self == GamePhase::GameOver
    }

    /// The role that acts during this sub-phase.
    pub fn acting_role(&self) -> Option<Role> {
        match self {
            GamePhase::WerewolfKill => Some(Role::Werewolf),
            GamePhase::Protector => Some(Role::Doctor),
            GamePhase::Investigator => Some(Role::Seer),
            GamePhase::Sorceress => Some(Role::Sorceress),
            GamePhase::LimitedKiller => Some(Role::Vigilante),
            _ => None,
        }
    }

    pub fn for_action(kind: ActionKind) -> GamePhase {
        match kind {
            ActionKind::Kill => GamePhase::WerewolfKill,
            ActionKind::Protect => GamePhase::Protector,
            ActionKind::Investigate => GamePhase::Investigator,
            ActionKind::Sense => GamePhase::Sorceress,
            ActionKind::Shoot => GamePhase::LimitedKiller,
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Winner {
    Village,   // 村人陣営勝利
    Werewolf,  // 人狼陣営勝利
    Jester,    // 吊られた道化の単独勝利
    Aborted,   // 管理者による終了
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameResult {
    pub winner: Winner,
    pub winning_team: Option<Team>,
    pub winning_players: Vec<PlayerId>,
}

/// All mutable state of one running game. Only the phase controller and the
/// resolvers it calls touch this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: String,
    pub phase: GamePhase,
    pub day: u32,
    pub phase_deadline: Option<DateTime<Utc>>,
    pub players: Vec<Player>,
    pub alive: Vec<PlayerId>,
    pub dead: Vec<PlayerId>,
    pub night_order: Vec<GamePhase>,
    pub night: NightActionState,
    pub votes: VoteState,
    pub last_night: Option<NightOutcome>,
    pub eliminated_today: Option<PlayerId>,
    pub result: Option<GameResult>,
}

impl GameSession {
    pub fn new(session_id: String, players: Vec<Player>) -> Self {
        let alive = players.iter().map(|p| p.id.clone()).collect();
        GameSession {
            session_id,
            phase: GamePhase::Lobby,
            day: 0,
            phase_deadline: None,
            players,
            alive,
            dead: Vec::new(),
            night_order: Vec::new(),
            night: NightActionState::default(),
            votes: VoteState::default(),
            last_night: None,
            eliminated_today: None,
            result: None,
        }
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn is_alive(&self, player_id: &str) -> bool {
        self.player(player_id).is_some_and(Player::is_alive)
    }

    pub fn living(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive())
    }

    pub fn living_with_role(&self, role: Role) -> impl Iterator<Item = &Player> {
        self.living().filter(move |p| p.role == role)
    }

    pub fn living_on_team(&self, team: Team) -> impl Iterator<Item = &Player> {
        self.living().filter(move |p| p.team == team)
    }

    /// Moves a living player to the dead list. Returns `false` when the player
    /// is unknown or already dead.
    pub fn eliminate(&mut self, player_id: &str) -> bool {
        let Some(player) = self.player_mut(player_id) else {
            return false;
        };
        if player.is_dead {
            return false;
        }
        player.is_dead = true;
        self.alive.retain(|id| id != player_id);
        self.dead.push(player_id.to_string());
        true
    }

    /// Stores the terminal result. A result that is already set is never
    /// overwritten.
    pub fn set_result(&mut self, result: GameResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }

    pub fn reset_acted_flags(&mut self) {
        for player in &mut self.players {
            player.has_acted = false;
        }
    }

    pub fn reset_voted_flags(&mut self) {
        for player in &mut self.players {
            player.has_voted = false;
        }
    }
}

impl fmt::Display for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GameSession {{ session_id: {}, phase: {}, day: {}, alive: {:?}, dead: {:?}, result: {:?} }}",
            self.session_id, self.phase, self.day, self.alive, self.dead, self.result
        )
    }
}
