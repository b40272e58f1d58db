use tracing::info;

use crate::models::{
    game::{GamePhase, GameSession},
    night::{Death, DeathCause, Finding, Investigation, InvestigationReport, NightOutcome},
    player::PlayerId,
    role::{ActionKind, Role, Team},
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ActionRejected {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is dead")]
    ActorDead(PlayerId),
    #[error("target {0} is not a living player")]
    TargetNotAlive(PlayerId),
    #[error("{kind} is not accepted during {phase}")]
    WrongPhase { kind: ActionKind, phase: GamePhase },
    #[error("a {role} cannot {kind}")]
    WrongRole { role: Role, kind: ActionKind },
    #[error("player {0} has already acted this phase")]
    AlreadyActed(PlayerId),
    #[error("werewolves cannot target their own team")]
    TeammateTarget,
    #[error("{0} cannot target oneself")]
    SelfTarget(ActionKind),
    #[error("cannot protect oneself two nights in a row")]
    ConsecutiveSelfProtect,
    #[error("the one-time ability has already been used")]
    AbilitySpent,
}

/// Checks a night action against phase, role and target rules without
/// touching the session.
pub fn validate_action(
    session: &GameSession,
    actor_id: &str,
    target_id: &str,
    kind: ActionKind,
) -> Result<(), ActionRejected> {
    let actor = session
        .player(actor_id)
        .ok_or_else(|| ActionRejected::UnknownPlayer(actor_id.to_string()))?;
    if actor.is_dead {
        return Err(ActionRejected::ActorDead(actor_id.to_string()));
    }
    let target = session
        .player(target_id)
        .filter(|t| t.is_alive())
        .ok_or_else(|| ActionRejected::TargetNotAlive(target_id.to_string()))?;

    if session.phase != GamePhase::for_action(kind) {
        return Err(ActionRejected::WrongPhase {
            kind,
            phase: session.phase,
        });
    }
    if actor.role.action_kind() != Some(kind) {
        return Err(ActionRejected::WrongRole {
            role: actor.role,
            kind,
        });
    }
    // 人狼は同じ夜の間なら投票先を変えられる
    if actor.has_acted && kind != ActionKind::Kill {
        return Err(ActionRejected::AlreadyActed(actor_id.to_string()));
    }

    let is_self = actor_id == target_id;
    match kind {
        ActionKind::Kill => {
            if target.team == Team::Werewolf {
                return Err(ActionRejected::TeammateTarget);
            }
        }
        ActionKind::Protect => {
            let protected_self_last_night = actor
                .last_self_protect_night
                .is_some_and(|night| night + 1 == session.day);
            if is_self && protected_self_last_night {
                return Err(ActionRejected::ConsecutiveSelfProtect);
            }
        }
        ActionKind::Investigate | ActionKind::Sense => {
            if is_self {
                return Err(ActionRejected::SelfTarget(kind));
            }
        }
        ActionKind::Shoot => {
            if actor.ability_used {
                return Err(ActionRejected::AbilitySpent);
            }
            if is_self {
                return Err(ActionRejected::SelfTarget(kind));
            }
        }
    }
    Ok(())
}

/// Validates and stores a night action.
pub fn submit_action(
    session: &mut GameSession,
    actor_id: &str,
    target_id: &str,
    kind: ActionKind,
) -> Result<(), ActionRejected> {
    validate_action(session, actor_id, target_id, kind)?;

    let day = session.day;
    let night = &mut session.night;
    match kind {
        ActionKind::Kill => night.record_kill_vote(actor_id, target_id),
        ActionKind::Protect => night
            .protections
            .push((actor_id.to_string(), target_id.to_string())),
        ActionKind::Investigate | ActionKind::Sense => night.investigations.push(Investigation {
            investigator: actor_id.to_string(),
            target: target_id.to_string(),
            kind,
        }),
        ActionKind::Shoot => night
            .shots
            .push((actor_id.to_string(), target_id.to_string())),
    }

    if let Some(actor) = session.player_mut(actor_id) {
        actor.has_acted = true;
        if kind == ActionKind::Shoot {
            actor.ability_used = true;
        }
        if kind == ActionKind::Protect && actor_id == target_id {
            actor.last_self_protect_night = Some(day);
        }
    }
    Ok(())
}

/// Players who may still act in `phase`.
pub fn eligible_actors(session: &GameSession, phase: GamePhase) -> Vec<PlayerId> {
    let Some(role) = phase.acting_role() else {
        return Vec::new();
    };
    session
        .living_with_role(role)
        .filter(|p| role != Role::Vigilante || !p.ability_used || p.has_acted)
        .map(|p| p.id.clone())
        .collect()
}

/// True once every eligible actor of `phase` has submitted.
pub fn all_acted(session: &GameSession, phase: GamePhase) -> bool {
    eligible_actors(session, phase)
        .iter()
        .all(|id| session.player(id).is_some_and(|p| p.has_acted))
}

/// Whether `phase` belongs in tonight's order.
pub fn subphase_applies(session: &GameSession, phase: GamePhase) -> bool {
    let Some(role) = phase.acting_role() else {
        return false;
    };
    session
        .living_with_role(role)
        .any(|p| role != Role::Vigilante || !p.ability_used)
}

/// Targets `actor_id` may legally choose in `phase`.
pub fn legal_targets(session: &GameSession, phase: GamePhase, actor_id: &str) -> Vec<PlayerId> {
    let Some(kind) = phase.acting_role().and_then(|r| r.action_kind()) else {
        return Vec::new();
    };
    session
        .living()
        .filter(|target| {
            let is_self = target.id == actor_id;
            match kind {
                ActionKind::Kill => target.team != Team::Werewolf,
                ActionKind::Protect => {
                    !is_self
                        || !session
                            .player(actor_id)
                            .and_then(|a| a.last_self_protect_night)
                            .is_some_and(|night| night + 1 == session.day)
                }
                ActionKind::Investigate | ActionKind::Sense | ActionKind::Shoot => !is_self,
            }
        })
        .map(|p| p.id.clone())
        .collect()
}

/// Settles the night's actions into an outcome. Does not mutate the session;
/// the caller applies the deaths.
pub fn resolve_night(session: &GameSession) -> NightOutcome {
    let night = &session.night;
    let kill_target = night
        .resolved_kill_target()
        .filter(|id| session.is_alive(id));

    let was_saved = kill_target
        .as_deref()
        .is_some_and(|id| night.is_protected(id));

    let mut deaths: Vec<Death> = Vec::new();
    let mut saves = Vec::new();

    if let Some(target) = &kill_target {
        if was_saved {
            saves.push(target.clone());
        } else if let Some(player) = session.player(target) {
            deaths.push(Death {
                player_id: target.clone(),
                role: player.role,
                cause: DeathCause::WerewolfAttack,
            });
        }
    }

    // 狩人の弾は騎士の護衛に関係なく命中する
    for (_, target) in &night.shots {
        if deaths.iter().any(|d| &d.player_id == target) {
            continue;
        }
        if let Some(player) = session.player(target).filter(|p| p.is_alive()) {
            deaths.push(Death {
                player_id: target.clone(),
                role: player.role,
                cause: DeathCause::VigilanteShot,
            });
        }
    }

    let investigations = night
        .investigations
        .iter()
        .filter_map(|inv| {
            let target = session.player(&inv.target)?;
            let finding = match inv.kind {
                ActionKind::Sense if target.role == Role::Seer => Finding::Seer,
                ActionKind::Sense => Finding::NotSeer,
                _ if target.team == Team::Werewolf => Finding::Werewolf,
                _ => Finding::NotWerewolf,
            };
            Some(InvestigationReport {
                investigator: inv.investigator.clone(),
                target: inv.target.clone(),
                finding,
            })
        })
        .collect();

    info!(
        "Night {} resolved in session {}: target={:?} saved={} deaths={}",
        session.day,
        session.session_id,
        kill_target,
        was_saved,
        deaths.len()
    );

    NightOutcome {
        night: session.day,
        kill_target,
        was_saved,
        deaths,
        saves,
        investigations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::player::Player;

    fn session(roles: &[Role]) -> GameSession {
        let players = roles
            .iter()
            .enumerate()
            .map(|(i, role)| Player::new(format!("p{}", i), format!("Player{}", i), *role))
            .collect();
        let mut session = GameSession::new("room".to_string(), players);
        session.day = 1;
        session
    }

    #[test]
    fn test_kill_rejected_outside_its_phase() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Doctor]);
        s.phase = GamePhase::Protector;
        assert_eq!(
            submit_action(&mut s, "p0", "p1", ActionKind::Kill),
            Err(ActionRejected::WrongPhase {
                kind: ActionKind::Kill,
                phase: GamePhase::Protector
            })
        );
        assert!(s.night.kill_votes.is_empty());
    }

    #[test]
    fn test_werewolf_cannot_target_teammate() {
        let mut s = session(&[Role::Werewolf, Role::Sorceress, Role::Villager]);
        s.phase = GamePhase::WerewolfKill;
        assert_eq!(
            submit_action(&mut s, "p0", "p1", ActionKind::Kill),
            Err(ActionRejected::TeammateTarget)
        );
        assert!(submit_action(&mut s, "p0", "p2", ActionKind::Kill).is_ok());
    }

    #[test]
    fn test_wrong_role_and_dead_actor() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Seer]);
        s.phase = GamePhase::WerewolfKill;
        assert_eq!(
            submit_action(&mut s, "p1", "p2", ActionKind::Kill),
            Err(ActionRejected::WrongRole {
                role: Role::Villager,
                kind: ActionKind::Kill
            })
        );
        s.eliminate("p0");
        assert_eq!(
            submit_action(&mut s, "p0", "p2", ActionKind::Kill),
            Err(ActionRejected::ActorDead("p0".to_string()))
        );
    }

    #[test]
    fn test_seer_cannot_investigate_self_or_twice() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Seer]);
        s.phase = GamePhase::Investigator;
        assert_eq!(
            submit_action(&mut s, "p2", "p2", ActionKind::Investigate),
            Err(ActionRejected::SelfTarget(ActionKind::Investigate))
        );
        assert!(submit_action(&mut s, "p2", "p0", ActionKind::Investigate).is_ok());
        assert_eq!(
            submit_action(&mut s, "p2", "p1", ActionKind::Investigate),
            Err(ActionRejected::AlreadyActed("p2".to_string()))
        );
    }

    #[test]
    fn test_doctor_self_protect_not_twice_in_a_row() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Doctor]);
        s.phase = GamePhase::Protector;
        assert!(submit_action(&mut s, "p2", "p2", ActionKind::Protect).is_ok());
        assert_eq!(s.player("p2").unwrap().last_self_protect_night, Some(1));

        s.day = 2;
        s.reset_acted_flags();
        assert_eq!(
            submit_action(&mut s, "p2", "p2", ActionKind::Protect),
            Err(ActionRejected::ConsecutiveSelfProtect)
        );
        assert!(!legal_targets(&s, GamePhase::Protector, "p2").contains(&"p2".to_string()));
        assert!(submit_action(&mut s, "p2", "p1", ActionKind::Protect).is_ok());

        s.day = 3;
        s.reset_acted_flags();
        assert!(submit_action(&mut s, "p2", "p2", ActionKind::Protect).is_ok());
    }

    #[test]
    fn test_vigilante_single_shot() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Vigilante]);
        s.phase = GamePhase::LimitedKiller;
        assert!(subphase_applies(&s, GamePhase::LimitedKiller));
        assert_eq!(
            submit_action(&mut s, "p2", "p2", ActionKind::Shoot),
            Err(ActionRejected::SelfTarget(ActionKind::Shoot))
        );
        assert!(submit_action(&mut s, "p2", "p0", ActionKind::Shoot).is_ok());
        assert!(all_acted(&s, GamePhase::LimitedKiller));

        s.reset_acted_flags();
        assert_eq!(
            submit_action(&mut s, "p2", "p1", ActionKind::Shoot),
            Err(ActionRejected::AbilitySpent)
        );
        assert!(!subphase_applies(&s, GamePhase::LimitedKiller));
    }

    #[test]
    fn test_suppressed_kill() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Doctor]);
        s.phase = GamePhase::WerewolfKill;
        submit_action(&mut s, "p0", "p1", ActionKind::Kill).unwrap();
        s.night.freeze_kill_target();
        s.phase = GamePhase::Protector;
        submit_action(&mut s, "p2", "p1", ActionKind::Protect).unwrap();

        let outcome = resolve_night(&s);
        assert!(outcome.was_saved);
        assert!(outcome.deaths.is_empty());
        assert_eq!(outcome.saves, vec!["p1".to_string()]);
    }

    #[test]
    fn test_independent_kills_both_land() {
        let mut s = session(&[
            Role::Werewolf,
            Role::Villager,
            Role::Doctor,
            Role::Vigilante,
            Role::Villager,
        ]);
        s.night.record_kill_vote("p0", "p1");
        s.night.freeze_kill_target();
        s.night.protections.push(("p2".to_string(), "p3".to_string()));
        s.night.shots.push(("p3".to_string(), "p4".to_string()));

        let outcome = resolve_night(&s);
        assert!(!outcome.was_saved);
        let dead: Vec<_> = outcome.deaths.iter().map(|d| d.player_id.as_str()).collect();
        assert_eq!(dead, vec!["p1", "p4"]);
        assert_eq!(outcome.deaths[0].cause, DeathCause::WerewolfAttack);
        assert_eq!(outcome.deaths[1].cause, DeathCause::VigilanteShot);
    }

    #[test]
    fn test_coincident_attacks_on_protected_player() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Doctor, Role::Vigilante]);
        s.night.record_kill_vote("p0", "p1");
        s.night.freeze_kill_target();
        s.night.protections.push(("p2".to_string(), "p1".to_string()));
        s.night.shots.push(("p3".to_string(), "p1".to_string()));

        let outcome = resolve_night(&s);
        assert!(outcome.was_saved);
        assert_eq!(outcome.deaths.len(), 1);
        assert_eq!(outcome.deaths[0].player_id, "p1");
        assert_eq!(outcome.deaths[0].cause, DeathCause::VigilanteShot);
    }

    #[test]
    fn test_coincident_attacks_unprotected_die_once() {
        let mut s = session(&[Role::Werewolf, Role::Villager, Role::Vigilante]);
        s.night.record_kill_vote("p0", "p1");
        s.night.shots.push(("p2".to_string(), "p1".to_string()));

        let outcome = resolve_night(&s);
        assert_eq!(outcome.deaths.len(), 1);
        assert_eq!(outcome.deaths[0].cause, DeathCause::WerewolfAttack);
    }

    #[test]
    fn test_investigation_findings() {
        let mut s = session(&[Role::Werewolf, Role::Seer, Role::Sorceress, Role::Villager]);
        s.night.investigations.push(Investigation {
            investigator: "p1".to_string(),
            target: "p2".to_string(),
            kind: ActionKind::Investigate,
        });
        s.night.investigations.push(Investigation {
            investigator: "p2".to_string(),
            target: "p1".to_string(),
            kind: ActionKind::Sense,
        });
        s.night.investigations.push(Investigation {
            investigator: "p2".to_string(),
            target: "p3".to_string(),
            kind: ActionKind::Sense,
        });

        let findings: Vec<_> = resolve_night(&s)
            .investigations
            .into_iter()
            .map(|r| r.finding)
            .collect();
        assert_eq!(
            findings,
            vec![Finding::Werewolf, Finding::Seer, Finding::NotSeer]
        );
    }

    #[test]
    fn test_empty_night_has_no_deaths() {
        let s = session(&[Role::Werewolf, Role::Villager, Role::Villager]);
        let outcome = resolve_night(&s);
        assert_eq!(outcome.kill_target, None);
        assert!(!outcome.was_saved);
        assert!(outcome.deaths.is_empty());
    }

    #[test]
    fn test_legal_targets_for_werewolves() {
        let s = session(&[Role::Werewolf, Role::Sorceress, Role::Villager, Role::Seer]);
        assert_eq!(
            legal_targets(&s, GamePhase::WerewolfKill, "p0"),
            vec!["p2".to_string(), "p3".to_string()]
        );
        assert_eq!(
            eligible_actors(&s, GamePhase::WerewolfKill),
            vec!["p0".to_string()]
        );
    }
}
