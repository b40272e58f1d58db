use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Villager,  // 村人
    Werewolf,  // 人狼
    Seer,      // 占い師
    Doctor,    // 騎士
    Vigilante, // 一度だけ撃てる狩人
    Sorceress, // 占い師を探す狂人
    Jester,    // 吊られると勝ち
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Village,
    Werewolf,
    Neutral,
}

/// The kind of night action a role submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Kill,
    Protect,
    Investigate,
    Sense,
    Shoot,
}

impl Role {
    pub fn team(&self) -> Team {
        match self {
            Role::Werewolf | Role::Sorceress => Team::Werewolf,
            Role::Jester => Team::Neutral,
            Role::Villager | Role::Seer | Role::Doctor | Role::Vigilante => Team::Village,
        }
    }

    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            Role::Werewolf => Some(ActionKind::Kill),
            Role::Doctor => Some(ActionKind::Protect),
            Role::Seer => Some(ActionKind::Investigate),
            Role::Sorceress => Some(ActionKind::Sense),
            Role::Vigilante => Some(ActionKind::Shoot),
            Role::Villager | Role::Jester => None,
        }
    }

    /// Roles that win on their own when the town executes them.
    pub fn wins_when_executed(&self) -> bool {
        matches!(self, Role::Jester)
    }

    pub fn is_special_neutral(&self) -> bool {
        self.team() == Team::Neutral
    }
}

impl ActionKind {
    pub fn role(&self) -> Role {
        match self {
            ActionKind::Kill => Role::Werewolf,
            ActionKind::Protect => Role::Doctor,
            ActionKind::Investigate => Role::Seer,
            ActionKind::Sense => Role::Sorceress,
            ActionKind::Shoot => Role::Vigilante,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Villager => write!(f, "Villager"),
            Role::Werewolf => write!(f, "Werewolf"),
            Role::Seer => write!(f, "Seer"),
            Role::Doctor => write!(f, "Doctor"),
            Role::Vigilante => write!(f, "Vigilante"),
            Role::Sorceress => write!(f, "Sorceress"),
            Role::Jester => write!(f, "Jester"),
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Village => write!(f, "village"),
            Team::Werewolf => write!(f, "werewolf"),
            Team::Neutral => write!(f, "neutral"),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Kill => write!(f, "kill"),
            ActionKind::Protect => write!(f, "protect"),
            ActionKind::Investigate => write!(f, "investigate"),
            ActionKind::Sense => write!(f, "sense"),
            ActionKind::Shoot => write!(f, "shoot"),
        }
    }
}
