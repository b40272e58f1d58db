use serde::{Deserialize, Serialize};

use super::{
    player::PlayerId,
    role::{ActionKind, Role},
};

/// What an investigating role learned about its target.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    Werewolf,
    NotWerewolf,
    Seer,
    NotSeer,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Investigation {
    pub investigator: PlayerId,
    pub target: PlayerId,
    pub kind: ActionKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InvestigationReport {
    pub investigator: PlayerId,
    pub target: PlayerId,
    pub finding: Finding,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    WerewolfAttack,
    VigilanteShot,
    Executed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Death {
    pub player_id: PlayerId,
    pub role: Role,
    pub cause: DeathCause,
}

/// The settled result of one night. Built once when the day begins.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct NightOutcome {
    pub night: u32,
    pub kill_target: Option<PlayerId>,
    pub was_saved: bool,
    pub deaths: Vec<Death>,
    pub saves: Vec<PlayerId>,
    pub investigations: Vec<InvestigationReport>,
}

/// Scratch state for the actions submitted during one night.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NightActionState {
    // 人狼の襲撃投票（最初に投票した順）
    pub kill_votes: Vec<(PlayerId, PlayerId)>,
    pub protections: Vec<(PlayerId, PlayerId)>,
    pub investigations: Vec<Investigation>,
    pub shots: Vec<(PlayerId, PlayerId)>,
    pub kill_target: Option<PlayerId>,
    pub kill_frozen: bool,
}

impl NightActionState {
    /// Records a werewolf's kill vote, replacing that werewolf's earlier vote
    /// in place so the first-cast order is kept.
    pub fn record_kill_vote(&mut self, voter: &str, target: &str) {
        match self.kill_votes.iter_mut().find(|(v, _)| v == voter) {
            Some(entry) => entry.1 = target.to_string(),
            None => self
                .kill_votes
                .push((voter.to_string(), target.to_string())),
        }
    }

    /// Plurality over the kill votes. A tie goes to the target that reached
    /// the maximum first in vote order.
    pub fn tally_kill_target(&self) -> Option<PlayerId> {
        let mut counts: Vec<(&PlayerId, usize)> = Vec::new();
        for (_, target) in &self.kill_votes {
            match counts.iter_mut().find(|(t, _)| *t == target) {
                Some(entry) => entry.1 += 1,
                None => counts.push((target, 1)),
            }
        }

        let mut best: Option<(&PlayerId, usize)> = None;
        for (target, count) in counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((target, count));
            }
        }
        best.map(|(target, _)| target.clone())
    }

    /// Fixes the werewolf target when the kill sub-phase ends. Later calls
    /// keep the first frozen value.
    pub fn freeze_kill_target(&mut self) {
        if self.kill_frozen {
            return;
        }
        self.kill_target = self.tally_kill_target();
        self.kill_frozen = true;
    }

    /// The werewolf target, tallied on demand if the sub-phase never froze it.
    pub fn resolved_kill_target(&self) -> Option<PlayerId> {
        if self.kill_frozen {
            self.kill_target.clone()
        } else {
            self.tally_kill_target()
        }
    }

    pub fn is_protected(&self, player_id: &str) -> bool {
        self.protections.iter().any(|(_, target)| target == player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_vote_overwrites_in_place() {
        let mut night = NightActionState::default();
        night.record_kill_vote("w1", "a");
        night.record_kill_vote("w2", "b");
        night.record_kill_vote("w1", "b");
        assert_eq!(night.kill_votes.len(), 2);
        assert_eq!(night.kill_votes[0], ("w1".to_string(), "b".to_string()));
        assert_eq!(night.tally_kill_target(), Some("b".to_string()));
    }

    #[test]
    fn test_kill_tie_goes_to_first_observed_maximum() {
        let mut night = NightActionState::default();
        night.record_kill_vote("w1", "x");
        night.record_kill_vote("w2", "y");
        assert_eq!(night.tally_kill_target(), Some("x".to_string()));

        night.record_kill_vote("w3", "y");
        assert_eq!(night.tally_kill_target(), Some("y".to_string()));
    }

    #[test]
    fn test_no_votes_means_no_target() {
        let mut night = NightActionState::default();
        night.freeze_kill_target();
        assert!(night.kill_frozen);
        assert_eq!(night.resolved_kill_target(), None);
    }

    #[test]
    fn test_frozen_target_ignores_late_votes() {
        let mut night = NightActionState::default();
        night.record_kill_vote("w1", "x");
        night.freeze_kill_target();
        night.record_kill_vote("w1", "y");
        assert_eq!(night.resolved_kill_target(), Some("x".to_string()));
    }
}
