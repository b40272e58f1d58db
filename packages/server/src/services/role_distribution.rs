use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{
    config::GameConfig,
    player::{Player, Seat},
    role::{Role, Team},
};

/// At most this many special-neutral roles are dealt into one game.
pub const MAX_SPECIAL_NEUTRALS: usize = 2;
/// The Vigilante is only dealt into games of at least this size.
pub const VIGILANTE_MIN_PLAYERS: usize = 7;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DistributionError {
    #[error("at least {min} players are required, got {actual}")]
    NotEnoughPlayers { min: usize, actual: usize },
    #[error("expected {expected} roles, got {actual}")]
    WrongRoleCount { expected: usize, actual: usize },
    #[error("role balance violated: {0}")]
    Unbalanced(String),
}

/// Produces the multiset of roles for a game of `player_count` players.
pub trait RoleDistribution: Send + Sync {
    fn assign_roles(
        &self,
        player_count: usize,
        config: &GameConfig,
    ) -> Result<Vec<Role>, DistributionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedDistribution;

impl RoleDistribution for BalancedDistribution {
    fn assign_roles(
        &self,
        player_count: usize,
        config: &GameConfig,
    ) -> Result<Vec<Role>, DistributionError> {
        let min = config.min_players.max(5);
        if player_count < min {
            return Err(DistributionError::NotEnoughPlayers {
                min,
                actual: player_count,
            });
        }

        let n = player_count;
        let werewolf_slots = n / 4;
        let sorceress = usize::from(config.enable_sorceress && werewolf_slots >= 2);
        let werewolves = werewolf_slots - sorceress;
        let seers = if config.enable_seer {
            (n / 12).clamp(1, 3)
        } else {
            0
        };
        let doctors = if config.enable_doctor {
            (n / 15).clamp(1, 2)
        } else {
            0
        };
        let vigilante = usize::from(config.enable_vigilante && n >= VIGILANTE_MIN_PLAYERS);
        let jester = usize::from(config.enable_jester && n >= config.neutral_min_players);

        let special = werewolf_slots + seers + doctors + vigilante + jester;
        let villagers = n.checked_sub(special).ok_or_else(|| {
            DistributionError::Unbalanced(format!("{} special roles for {} players", special, n))
        })?;

        let mut roles = Vec::with_capacity(n);
        roles.extend(std::iter::repeat(Role::Werewolf).take(werewolves));
        roles.extend(std::iter::repeat(Role::Sorceress).take(sorceress));
        roles.extend(std::iter::repeat(Role::Seer).take(seers));
        roles.extend(std::iter::repeat(Role::Doctor).take(doctors));
        roles.extend(std::iter::repeat(Role::Vigilante).take(vigilante));
        roles.extend(std::iter::repeat(Role::Jester).take(jester));
        roles.extend(std::iter::repeat(Role::Villager).take(villagers));

        check_balance(&roles)?;
        Ok(roles)
    }
}

/// Hard balance rules every distribution must satisfy.
pub fn check_balance(roles: &[Role]) -> Result<(), DistributionError> {
    let adversarial = roles.iter().filter(|r| r.team() == Team::Werewolf).count();
    let neutrals = roles.iter().filter(|r| r.is_special_neutral()).count();
    let others = roles.len() - adversarial;

    if adversarial == 0 {
        return Err(DistributionError::Unbalanced("no werewolves".to_string()));
    }
    if adversarial >= others {
        return Err(DistributionError::Unbalanced(format!(
            "{} werewolves against {} others",
            adversarial, others
        )));
    }
    // 人狼陣営は全体の1/3まで
    if adversarial * 3 > roles.len() {
        return Err(DistributionError::Unbalanced(format!(
            "{} werewolves exceed a third of {} players",
            adversarial,
            roles.len()
        )));
    }
    if neutrals > MAX_SPECIAL_NEUTRALS {
        return Err(DistributionError::Unbalanced(format!(
            "{} special neutral roles",
            neutrals
        )));
    }
    Ok(())
}

/// Shuffles `roles` onto the roster.
pub fn deal_roles<R: Rng + ?Sized>(
    seats: &[Seat],
    mut roles: Vec<Role>,
    rng: &mut R,
) -> Result<Vec<Player>, DistributionError> {
    if roles.len() != seats.len() {
        return Err(DistributionError::WrongRoleCount {
            expected: seats.len(),
            actual: roles.len(),
        });
    }
    roles.shuffle(rng);
    Ok(seats
        .iter()
        .zip(roles)
        .map(|(seat, role)| Player::new(seat.id.clone(), seat.name.clone(), role))
        .collect())
}
