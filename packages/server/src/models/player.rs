use serde::{Deserialize, Serialize};

use super::role::{Role, Team};

pub type PlayerId = String;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    pub team: Team,
    pub is_dead: bool,
    pub has_acted: bool,
    pub has_voted: bool,
    // 狩人の一発
    pub ability_used: bool,
    // 騎士が自分を守った直近の夜
    pub last_self_protect_night: Option<u32>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, role: Role) -> Self {
        Self {
            id,
            name,
            team: role.team(),
            role,
            is_dead: false,
            has_acted: false,
            has_voted: false,
            ability_used: false,
            last_self_protect_night: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }
}

/// A roster entry before roles are dealt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub id: PlayerId,
    pub name: String,
}

impl Seat {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
