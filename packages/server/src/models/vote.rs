use serde::{Deserialize, Serialize};

use super::player::PlayerId;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoteTarget {
    Player(PlayerId),
    Abstain,
}

impl VoteTarget {
    pub fn player(&self) -> Option<&str> {
        match self {
            VoteTarget::Player(id) => Some(id),
            VoteTarget::Abstain => None,
        }
    }
}

/// Ballots for one day. One entry per voter; re-votes overwrite.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct VoteState {
    pub day: u32,
    pub ballots: Vec<(PlayerId, VoteTarget)>,
}

impl VoteState {
    pub fn new(day: u32) -> Self {
        VoteState {
            day,
            ballots: Vec::new(),
        }
    }

    pub fn cast(&mut self, voter: &str, target: VoteTarget) {
        match self.ballots.iter_mut().find(|(v, _)| v == voter) {
            Some(entry) => entry.1 = target,
            None => self.ballots.push((voter.to_string(), target)),
        }
    }

    pub fn ballot_of(&self, voter: &str) -> Option<&VoteTarget> {
        self.ballots
            .iter()
            .find(|(v, _)| v == voter)
            .map(|(_, target)| target)
    }

    /// Votes per target, highest first. Equal counts keep the order in which
    /// the target first received a vote. Abstentions are not counted.
    pub fn tally(&self) -> Vec<(PlayerId, usize)> {
        let mut counts: Vec<(PlayerId, usize)> = Vec::new();
        for target in self.ballots.iter().filter_map(|(_, t)| t.player()) {
            match counts.iter_mut().find(|(t, _)| t == target) {
                Some(entry) => entry.1 += 1,
                None => counts.push((target.to_string(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}
