use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::{
    config::GameConfig,
    event::{Audience, GameEvent, GameStateView, PlayerView, SessionEvent},
    game::{GamePhase, GameResult, GameSession, Winner, NIGHT_ORDER},
    night::{DeathCause, NightActionState},
    player::{Player, Seat},
    role::{ActionKind, Team},
    vote::{VoteState, VoteTarget},
};
use crate::services::{
    audit::{AuditRecord, AuditSink, SnapshotWriter},
    clock::{Clock, TimerHandle},
    night_resolver,
    role_distribution::{deal_roles, DistributionError, RoleDistribution},
    vote_service, win_evaluator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Expire,
    Tick,
}

/// Identifies the phase a timer was started for. A token whose phase or
/// epoch no longer matches the controller is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub phase: GamePhase,
    pub epoch: u64,
    pub kind: TimerKind,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionRejected {
    #[error("transition {from} -> {to} is not allowed")]
    NotAllowed { from: GamePhase, to: GamePhase },
    #[error("transition {from} -> {to} rejected: result already decided")]
    ResultDecided { from: GamePhase, to: GamePhase },
    #[error("transition {from} -> {to} is out of night order, expected {expected}")]
    OutOfOrder {
        from: GamePhase,
        to: GamePhase,
        expected: GamePhase,
    },
}

/// Where fired timers are delivered. The session actor routes these back into
/// its command queue so they are serialized with player input.
pub type TimerSink = Arc<dyn Fn(TimerToken) + Send + Sync>;

#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
    pub snapshots: Option<SnapshotWriter>,
    pub events: broadcast::Sender<SessionEvent>,
    pub timer_sink: TimerSink,
}

pub struct PhaseController {
    session: GameSession,
    config: GameConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    snapshots: Option<SnapshotWriter>,
    events: broadcast::Sender<SessionEvent>,
    timer_sink: TimerSink,
    rng: StdRng,
    epoch: u64,
    timers: Vec<TimerHandle>,
}

impl PhaseController {
    /// Deals roles from `distribution` onto `seats` and builds a controller
    /// waiting in the lobby.
    pub fn with_roster(
        session_id: String,
        seats: &[Seat],
        distribution: &dyn RoleDistribution,
        config: GameConfig,
        collaborators: Collaborators,
    ) -> Result<Self, DistributionError> {
        let mut rng = seeded_rng(&config);
        let roles = distribution.assign_roles(seats.len(), &config)?;
        let players = deal_roles(seats, roles, &mut rng)?;
        Ok(Self::build(session_id, players, config, collaborators, rng))
    }

    /// Builds a controller for players whose roles are already dealt.
    pub fn new(
        session_id: String,
        players: Vec<Player>,
        config: GameConfig,
        collaborators: Collaborators,
    ) -> Self {
        let rng = seeded_rng(&config);
        Self::build(session_id, players, config, collaborators, rng)
    }

    fn build(
        session_id: String,
        players: Vec<Player>,
        config: GameConfig,
        collaborators: Collaborators,
        rng: StdRng,
    ) -> Self {
        Self {
            session: GameSession::new(session_id, players),
            config,
            clock: collaborators.clock,
            audit: collaborators.audit,
            snapshots: collaborators.snapshots,
            events: collaborators.events,
            timer_sink: collaborators.timer_sink,
            rng,
            epoch: 0,
            timers: Vec::new(),
        }
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn phase(&self) -> GamePhase {
        self.session.phase
    }

    /// New receiver for this session's events. The controller holds the only
    /// sender, so receivers see `Closed` once the controller is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.session.phase.is_terminal()
    }

    pub fn start(&mut self) -> bool {
        self.transition_to(GamePhase::RoleReveal)
    }

    /// Moves to `next` if the transition table allows it. Rejected requests
    /// leave the session untouched.
    pub fn transition_to(&mut self, next: GamePhase) -> bool {
        match self.try_transition(next) {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: {}", self.session.session_id, e);
                false
            }
        }
    }

    pub fn try_transition(&mut self, next: GamePhase) -> Result<(), TransitionRejected> {
        let current = self.session.phase;
        if !current.can_transition_to(next) {
            return Err(TransitionRejected::NotAllowed {
                from: current,
                to: next,
            });
        }
        if self.session.result.is_some() && next != GamePhase::GameOver {
            return Err(TransitionRejected::ResultDecided {
                from: current,
                to: next,
            });
        }
        if let Some(expected) = self.expected_night_successor() {
            if next != expected && next != GamePhase::GameOver {
                return Err(TransitionRejected::OutOfOrder {
                    from: current,
                    to: next,
                    expected,
                });
            }
        }
        self.enter(next);
        Ok(())
    }

    /// Administrative shortcut from discussion straight to the vote.
    pub fn force_to_voting(&mut self) -> bool {
        info!("Forcing session {} to voting", self.session.session_id);
        self.transition_to(GamePhase::Voting)
    }

    /// Administrative end of the game.
    pub fn end_game(&mut self) -> bool {
        self.transition_to(GamePhase::GameOver)
    }

    pub fn submit_night_action(&mut self, player_id: &str, target_id: &str, kind: ActionKind) -> bool {
        let phase = self.session.phase;
        match night_resolver::submit_action(&mut self.session, player_id, target_id, kind) {
            Ok(()) => {
                debug!(
                    "Accepted {} by {} on {} in session {}",
                    kind, player_id, target_id, self.session.session_id
                );
                self.audit(player_id, &kind.to_string(), Some(target_id), "accepted");
                if kind == ActionKind::Kill {
                    self.emit(
                        Audience::Team(Team::Werewolf),
                        GameEvent::KillVoteUpdate {
                            votes: self.session.night.kill_votes.clone(),
                        },
                    );
                }
                if night_resolver::all_acted(&self.session, phase) {
                    self.advance_night();
                }
                true
            }
            Err(e) => {
                warn!(
                    "Rejected {} by {} on {} in session {}: {}",
                    kind, player_id, target_id, self.session.session_id, e
                );
                self.audit(player_id, &kind.to_string(), Some(target_id), &e.to_string());
                false
            }
        }
    }

    pub fn submit_vote(&mut self, voter_id: &str, target: VoteTarget) -> bool {
        let target_id = target.player().map(str::to_string);
        match vote_service::submit_vote(&mut self.session, voter_id, target) {
            Ok(()) => {
                self.audit(voter_id, "vote", target_id.as_deref(), "accepted");
                self.emit(
                    Audience::All,
                    GameEvent::VoteUpdate {
                        day: self.session.day,
                        tally: self.session.votes.tally(),
                        votes_cast: self.session.votes.ballots.len(),
                    },
                );
                if vote_service::everyone_voted(&self.session) {
                    self.transition_to(GamePhase::Resolution);
                }
                true
            }
            Err(e) => {
                warn!(
                    "Rejected vote by {} in session {}: {}",
                    voter_id, self.session.session_id, e
                );
                self.audit(voter_id, "vote", target_id.as_deref(), &e.to_string());
                false
            }
        }
    }

    /// Handles a fired timer. Stale tokens are ignored.
    pub fn on_timer(&mut self, token: TimerToken) {
        if token.epoch != self.epoch || token.phase != self.session.phase {
            debug!(
                "Ignoring stale {:?} timer for {} in session {}",
                token.kind, token.phase, self.session.session_id
            );
            return;
        }
        match token.kind {
            TimerKind::Expire => {
                if let Some(next) = self.timeout_successor() {
                    info!(
                        "Timer expired for {} in session {}",
                        token.phase, self.session.session_id
                    );
                    self.transition_to(next);
                }
            }
            TimerKind::Tick => self.on_tick(),
        }
    }

    pub fn get_state(&self, viewer: Option<&str>) -> GameStateView {
        let session = &self.session;
        let viewer_team = viewer.and_then(|id| session.player(id)).map(|p| p.team);
        let players = session
            .players
            .iter()
            .map(|p| {
                let visible = self.config.reveal_roles
                    || p.is_dead
                    || session.phase.is_terminal()
                    || viewer == Some(p.id.as_str())
                    || (viewer_team == Some(Team::Werewolf) && p.team == Team::Werewolf);
                PlayerView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    is_dead: p.is_dead,
                    role: visible.then_some(p.role),
                }
            })
            .collect();

        let legal_targets = match viewer {
            Some(id) if session.phase == GamePhase::Voting && session.is_alive(id) => session
                .living()
                .filter(|p| p.id != id)
                .map(|p| p.id.clone())
                .collect(),
            Some(id)
                if night_resolver::eligible_actors(session, session.phase).iter().any(|a| a == id) =>
            {
                night_resolver::legal_targets(session, session.phase, id)
            }
            _ => Vec::new(),
        };

        GameStateView {
            session_id: session.session_id.clone(),
            phase: session.phase,
            day: session.day,
            remaining_seconds: self.remaining_seconds(),
            players,
            alive: session.alive.clone(),
            dead: session.dead.clone(),
            legal_targets,
            vote_tally: session.votes.tally(),
            eliminated_today: session.eliminated_today.clone(),
            result: session.result.clone(),
        }
    }

    fn enter(&mut self, next: GamePhase) {
        let from = self.session.phase;
        if from == GamePhase::WerewolfKill {
            // 騎士のフェーズから襲撃先が見えないよう、ここで確定させる
            self.session.night.freeze_kill_target();
        }

        self.cancel_timers();
        self.epoch += 1;
        self.session.phase = next;
        let duration = self.config.phase_duration(next);
        self.session.phase_deadline = duration.map(|d| self.clock.now() + to_chrono(d));

        self.prepare(next);

        info!(
            "Session {} phase {} -> {} (day {})",
            self.session.session_id, from, next, self.session.day
        );
        self.emit(
            Audience::All,
            GameEvent::PhaseChange {
                from_phase: from,
                to_phase: next,
                day: self.session.day,
                remaining_seconds: self.remaining_seconds(),
            },
        );

        let epoch = self.epoch;
        let follow = self.on_enter(next);
        // 夜の結果や勝敗が反映された後の状態を残す
        if let Some(writer) = &self.snapshots {
            writer.submit(&self.session);
        }
        match follow {
            Some(follow) => {
                self.transition_to(follow);
            }
            None if self.epoch == epoch => self.start_timers(next, duration),
            None => {}
        }
    }

    /// Resets per-phase state before the phase change is announced.
    fn prepare(&mut self, phase: GamePhase) {
        match phase {
            GamePhase::Night => {
                self.session.day += 1;
                self.session.night = NightActionState::default();
                self.session.eliminated_today = None;
                self.session.reset_acted_flags();
            }
            GamePhase::Voting => {
                self.session.votes = VoteState::new(self.session.day);
                self.session.reset_voted_flags();
            }
            _ => {}
        }
    }

    /// Entry routine for `phase`. Returns the phase to cascade into, if any.
    fn on_enter(&mut self, phase: GamePhase) -> Option<GamePhase> {
        match phase {
            GamePhase::Lobby | GamePhase::RoleReveal | GamePhase::Voting => None,
            GamePhase::Night => {
                let order: Vec<GamePhase> = NIGHT_ORDER
                    .iter()
                    .copied()
                    .filter(|p| night_resolver::subphase_applies(&self.session, *p))
                    .collect();
                debug!(
                    "Night {} order for session {}: {:?}",
                    self.session.day, self.session.session_id, order
                );
                let first = order.first().copied().unwrap_or(GamePhase::DayDiscussion);
                self.session.night_order = order;
                Some(first)
            }
            GamePhase::WerewolfKill
            | GamePhase::Protector
            | GamePhase::Investigator
            | GamePhase::Sorceress
            | GamePhase::LimitedKiller => self.enter_subphase(phase),
            GamePhase::DayDiscussion => self.enter_day(),
            GamePhase::Resolution => {
                self.enter_resolution();
                None
            }
            GamePhase::GameOver => {
                self.enter_game_over();
                None
            }
        }
    }

    fn enter_subphase(&mut self, phase: GamePhase) -> Option<GamePhase> {
        let actors = night_resolver::eligible_actors(&self.session, phase);
        if actors.is_empty() || night_resolver::all_acted(&self.session, phase) {
            return Some(self.next_night_phase(phase));
        }
        let (Some(role), Some(action)) = (
            phase.acting_role(),
            phase.acting_role().and_then(|r| r.action_kind()),
        ) else {
            return Some(self.next_night_phase(phase));
        };
        let remaining = self.remaining_seconds().unwrap_or(0);
        for actor in actors {
            let targets = night_resolver::legal_targets(&self.session, phase, &actor);
            self.emit(
                Audience::Players(vec![actor]),
                GameEvent::ActionRequired {
                    role,
                    action,
                    remaining_seconds: remaining,
                    targets,
                },
            );
        }
        None
    }

    fn enter_day(&mut self) -> Option<GamePhase> {
        self.session.night.freeze_kill_target();
        let outcome = night_resolver::resolve_night(&self.session);

        for death in &outcome.deaths {
            if self.session.eliminate(&death.player_id) {
                self.emit(
                    Audience::All,
                    GameEvent::PlayerEliminated {
                        player_id: death.player_id.clone(),
                        role: death.role,
                        cause: death.cause,
                    },
                );
            }
        }
        self.emit(
            Audience::All,
            GameEvent::NightResult {
                night: outcome.night,
                was_saved: outcome.was_saved,
                deaths: outcome.deaths.clone(),
                saves: outcome.saves.clone(),
            },
        );
        for report in &outcome.investigations {
            self.emit(
                Audience::Players(vec![report.investigator.clone()]),
                GameEvent::InvestigationResult {
                    report: report.clone(),
                },
            );
        }

        let anyone_died = !outcome.deaths.is_empty();
        self.session.last_night = Some(outcome);
        if anyone_died {
            if let Some(result) = win_evaluator::evaluate(&self.session) {
                self.session.set_result(result);
                return Some(GamePhase::GameOver);
            }
        }
        None
    }

    fn enter_resolution(&mut self) {
        let resolution =
            vote_service::resolve_votes(&self.session, self.config.tie_break, &mut self.rng);
        self.session.eliminated_today = resolution.eliminated.clone();

        let Some(executed) = resolution.eliminated else {
            return;
        };
        if let Some(win) = win_evaluator::execution_win(&self.session, &executed) {
            info!(
                "Player {} won session {} by being executed",
                executed, self.session.session_id
            );
            self.session.set_result(win);
        }
        if self.session.eliminate(&executed) {
            if let Some(player) = self.session.player(&executed) {
                let role = player.role;
                self.emit(
                    Audience::All,
                    GameEvent::PlayerEliminated {
                        player_id: executed.clone(),
                        role,
                        cause: DeathCause::Executed,
                    },
                );
            }
        }
        if let Some(result) = win_evaluator::evaluate(&self.session) {
            self.session.set_result(result);
        }
    }

    fn enter_game_over(&mut self) {
        if self.session.result.is_none() {
            self.session.set_result(GameResult {
                winner: Winner::Aborted,
                winning_team: None,
                winning_players: Vec::new(),
            });
        }
        self.session.phase_deadline = None;
        if let Some(result) = self.session.result.clone() {
            info!(
                "Session {} finished: {:?} ({:?})",
                self.session.session_id, result.winner, result.winning_players
            );
            self.emit(Audience::All, GameEvent::GameEnd { result });
        }
    }

    fn next_night_phase(&self, current: GamePhase) -> GamePhase {
        let order = &self.session.night_order;
        order
            .iter()
            .position(|p| *p == current)
            .and_then(|i| order.get(i + 1))
            .copied()
            .unwrap_or(GamePhase::DayDiscussion)
    }

    /// The only phase a night may move to next, besides `GameOver`.
    fn expected_night_successor(&self) -> Option<GamePhase> {
        match self.session.phase {
            GamePhase::Night => Some(
                self.session
                    .night_order
                    .first()
                    .copied()
                    .unwrap_or(GamePhase::DayDiscussion),
            ),
            phase if phase.is_night_subphase() => Some(self.next_night_phase(phase)),
            _ => None,
        }
    }

    fn advance_night(&mut self) {
        let current = self.session.phase;
        if current.is_night_subphase() {
            let next = self.next_night_phase(current);
            self.transition_to(next);
        }
    }

    fn timeout_successor(&self) -> Option<GamePhase> {
        match self.session.phase {
            GamePhase::RoleReveal => Some(GamePhase::Night),
            phase if phase.is_night_subphase() => Some(self.next_night_phase(phase)),
            GamePhase::DayDiscussion => Some(GamePhase::Voting),
            GamePhase::Voting => Some(GamePhase::Resolution),
            GamePhase::Resolution if self.session.result.is_some() => Some(GamePhase::GameOver),
            GamePhase::Resolution => Some(GamePhase::Night),
            _ => None,
        }
    }

    fn start_timers(&mut self, phase: GamePhase, duration: Option<Duration>) {
        let Some(duration) = duration else {
            return;
        };
        self.schedule(phase, TimerKind::Expire, duration);
        if let Some(interval) = self.config.tick_interval() {
            if interval < duration {
                self.schedule(phase, TimerKind::Tick, interval);
            }
        }
    }

    fn schedule(&mut self, phase: GamePhase, kind: TimerKind, delay: Duration) {
        let token = TimerToken {
            phase,
            epoch: self.epoch,
            kind,
        };
        let sink = self.timer_sink.clone();
        let handle = self.clock.after(delay, Box::new(move || sink(token)));
        self.timers.push(handle);
    }

    fn on_tick(&mut self) {
        let phase = self.session.phase;
        let remaining = self.remaining_seconds().unwrap_or(0);
        let event = match phase.acting_role() {
            Some(role) => GameEvent::RoleTimerTick {
                role,
                phase,
                remaining_seconds: remaining,
            },
            None => GameEvent::TimerTick {
                phase,
                remaining_seconds: remaining,
            },
        };
        let audience = if phase.is_night_subphase() {
            Audience::Players(night_resolver::eligible_actors(&self.session, phase))
        } else {
            Audience::All
        };
        self.emit(audience, event);

        if let Some(interval) = self.config.tick_interval() {
            if remaining > interval.as_secs() {
                self.schedule(phase, TimerKind::Tick, interval);
            }
        }
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.cancel();
        }
    }

    fn remaining_seconds(&self) -> Option<u64> {
        self.session
            .phase_deadline
            .map(|deadline| (deadline - self.clock.now()).num_seconds().max(0) as u64)
    }

    fn emit(&self, audience: Audience, event: GameEvent) {
        let event = SessionEvent {
            session_id: self.session.session_id.clone(),
            audience,
            event,
            timestamp: Utc::now(),
        };
        if self.events.send(event).is_err() {
            debug!(
                "No subscribers for session {} events",
                self.session.session_id
            );
        }
    }

    fn audit(&self, player_id: &str, action: &str, target: Option<&str>, result: &str) {
        let record = AuditRecord::new(&self.session.session_id, player_id, action, target, result);
        if let Err(e) = self.audit.log_action(record) {
            warn!(
                "Audit log failed for session {}: {}",
                self.session.session_id, e
            );
        }
    }
}

impl Drop for PhaseController {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

fn seeded_rng(config: &GameConfig) -> StdRng {
    match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis() as i64)
}
