use crate::models::{
    game::{GameResult, GameSession, Winner},
    role::Team,
};

/// Checks whether the game has a winner after an elimination.
///
/// A result that is already set is final and is returned unchanged. Neutral
/// players count against the werewolves in the parity check but never share
/// a faction win.
pub fn evaluate(session: &GameSession) -> Option<GameResult> {
    if let Some(result) = &session.result {
        return Some(result.clone());
    }

    let werewolves = session.living_on_team(Team::Werewolf).count();
    let others = session
        .living()
        .filter(|p| p.team != Team::Werewolf)
        .count();

    if werewolves >= others && werewolves > 0 {
        return Some(faction_win(session, Winner::Werewolf, Team::Werewolf));
    }
    if werewolves == 0 {
        return Some(faction_win(session, Winner::Village, Team::Village));
    }
    None
}

/// The solo win for a player whose role wins by being executed.
pub fn execution_win(session: &GameSession, executed: &str) -> Option<GameResult> {
    let player = session.player(executed)?;
    player.role.wins_when_executed().then(|| GameResult {
        winner: Winner::Jester,
        winning_team: Some(player.team),
        winning_players: vec![player.id.clone()],
    })
}

fn faction_win(session: &GameSession, winner: Winner, team: Team) -> GameResult {
    GameResult {
        winner,
        winning_team: Some(team),
        winning_players: session.living_on_team(team).map(|p| p.id.clone()).collect(),
    }
}
