use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::models::{
    config::TieBreakPolicy,
    game::{GamePhase, GameSession},
    player::PlayerId,
    vote::VoteTarget,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VoteRejected {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is dead")]
    VoterDead(PlayerId),
    #[error("target {0} is not a living player")]
    TargetNotAlive(PlayerId),
    #[error("votes are not accepted during {0}")]
    NotVoting(GamePhase),
    #[error("players cannot vote for themselves")]
    SelfVote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Eliminated(PlayerId),
    Tied(Vec<PlayerId>),
    NoVotes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteResolution {
    pub tally: Vec<(PlayerId, usize)>,
    pub outcome: VoteOutcome,
    pub eliminated: Option<PlayerId>,
}

/// Records a day vote, overwriting the voter's earlier ballot.
pub fn submit_vote(
    session: &mut GameSession,
    voter_id: &str,
    target: VoteTarget,
) -> Result<(), VoteRejected> {
    if session.phase != GamePhase::Voting {
        return Err(VoteRejected::NotVoting(session.phase));
    }
    let voter = session
        .player(voter_id)
        .ok_or_else(|| VoteRejected::UnknownPlayer(voter_id.to_string()))?;
    if voter.is_dead {
        return Err(VoteRejected::VoterDead(voter_id.to_string()));
    }
    if let VoteTarget::Player(target_id) = &target {
        if target_id == voter_id {
            return Err(VoteRejected::SelfVote);
        }
        if !session.is_alive(target_id) {
            return Err(VoteRejected::TargetNotAlive(target_id.clone()));
        }
    }

    session.votes.cast(voter_id, target);
    if let Some(voter) = session.player_mut(voter_id) {
        voter.has_voted = true;
    }
    Ok(())
}

/// True once every living player has a ballot in.
pub fn everyone_voted(session: &GameSession) -> bool {
    session.living().all(|p| p.has_voted)
}

/// Settles the day's votes under `policy`.
pub fn resolve_votes<R: Rng + ?Sized>(
    session: &GameSession,
    policy: TieBreakPolicy,
    rng: &mut R,
) -> VoteResolution {
    // 死亡済みプレイヤーの票や死亡済みの対象は数えない
    let tally: Vec<(PlayerId, usize)> = session
        .votes
        .tally()
        .into_iter()
        .filter(|(target, _)| session.is_alive(target))
        .collect();

    let outcome = match tally.as_slice() {
        [] => VoteOutcome::NoVotes,
        [(only, _)] => VoteOutcome::Eliminated(only.clone()),
        [(first, top), (_, second), ..] if top > second => VoteOutcome::Eliminated(first.clone()),
        [(_, top), ..] => VoteOutcome::Tied(
            tally
                .iter()
                .filter(|(_, count)| count == top)
                .map(|(target, _)| target.clone())
                .collect(),
        ),
    };

    let eliminated = match &outcome {
        VoteOutcome::Eliminated(target) => Some(target.clone()),
        VoteOutcome::Tied(tied) => match policy {
            TieBreakPolicy::Random => tied.choose(rng).cloned(),
            TieBreakPolicy::NoElimination | TieBreakPolicy::Revote => None,
        },
        VoteOutcome::NoVotes => None,
    };

    info!(
        "Day {} vote in session {}: {:?}, eliminated={:?}",
        session.day, session.session_id, outcome, eliminated
    );

    VoteResolution {
        tally,
        outcome,
        eliminated,
    }
}
