use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info};

use crate::models::{
    config::GameConfig,
    event::{GameStateView, SessionEvent},
    game::GamePhase,
    player::{PlayerId, Seat},
    role::ActionKind,
    vote::VoteTarget,
};
use crate::services::{
    audit::{AuditSink, SnapshotWriter},
    clock::Clock,
    phase_controller::{Collaborators, PhaseController, TimerSink, TimerToken},
    role_distribution::{DistributionError, RoleDistribution},
};

const EVENT_BUFFER: usize = 1000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("game {0} not found")]
    NotFound(String),
    #[error("game {0} is already running")]
    AlreadyExists(String),
    #[error("game {0} has stopped")]
    Closed(String),
    #[error("cannot deal roles: {0}")]
    Distribution(#[from] DistributionError),
}

pub enum SessionCommand {
    Start {
        reply: oneshot::Sender<bool>,
    },
    Transition {
        phase: GamePhase,
        reply: oneshot::Sender<bool>,
    },
    NightAction {
        player_id: PlayerId,
        target_id: PlayerId,
        kind: ActionKind,
        reply: oneshot::Sender<bool>,
    },
    Vote {
        voter_id: PlayerId,
        target: VoteTarget,
        reply: oneshot::Sender<bool>,
    },
    ForceVoting {
        reply: oneshot::Sender<bool>,
    },
    End {
        reply: oneshot::Sender<bool>,
    },
    GetState {
        viewer: Option<PlayerId>,
        reply: oneshot::Sender<GameStateView>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<SessionEvent>>,
    },
    TimerFired(TimerToken),
}

/// Everything a new session needs besides its roster.
#[derive(Clone)]
pub struct SessionOptions {
    pub config: GameConfig,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
    pub snapshots: Option<SnapshotWriter>,
    pub distribution: Arc<dyn RoleDistribution>,
}

/// Cheap, cloneable front door to a running session task. The task stops
/// once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn subscribe(&self) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        self.request(|reply| SessionCommand::Subscribe { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| SessionError::Closed(self.session_id.clone()))?;
        response
            .await
            .map_err(|_| SessionError::Closed(self.session_id.clone()))
    }

    pub async fn start(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::Start { reply }).await
    }

    pub async fn transition_to(&self, phase: GamePhase) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::Transition { phase, reply })
            .await
    }

    pub async fn submit_night_action(
        &self,
        player_id: &str,
        target_id: &str,
        kind: ActionKind,
    ) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::NightAction {
            player_id: player_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            reply,
        })
        .await
    }

    pub async fn submit_vote(
        &self,
        voter_id: &str,
        target: VoteTarget,
    ) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::Vote {
            voter_id: voter_id.to_string(),
            target,
            reply,
        })
        .await
    }

    pub async fn force_to_voting(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::ForceVoting { reply })
            .await
    }

    pub async fn end(&self) -> Result<bool, SessionError> {
        self.request(|reply| SessionCommand::End { reply }).await
    }

    pub async fn state(&self, viewer: Option<&str>) -> Result<GameStateView, SessionError> {
        let viewer = viewer.map(str::to_string);
        self.request(|reply| SessionCommand::GetState { viewer, reply })
            .await
    }
}

/// Deals roles and starts the session task. The game stays in the lobby
/// until `start` is sent. Must be called inside a tokio runtime.
pub fn spawn_session(
    session_id: String,
    seats: &[Seat],
    options: SessionOptions,
) -> Result<SessionHandle, SessionError> {
    let (commands, inbox) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_BUFFER);

    // 弱参照にしておかないと、タイマーがキューを生かし続けてしまう
    let timers = commands.downgrade();
    let timer_sink: TimerSink = Arc::new(move |token| {
        if let Some(commands) = timers.upgrade() {
            let _ = commands.send(SessionCommand::TimerFired(token));
        }
    });

    let controller = PhaseController::with_roster(
        session_id.clone(),
        seats,
        options.distribution.as_ref(),
        options.config,
        Collaborators {
            clock: options.clock,
            audit: options.audit,
            snapshots: options.snapshots,
            events,
            timer_sink,
        },
    )?;

    tokio::spawn(run_session(controller, inbox));
    info!("Spawned session {} with {} players", session_id, seats.len());

    Ok(SessionHandle {
        session_id,
        commands,
    })
}

async fn run_session(
    mut controller: PhaseController,
    mut inbox: mpsc::UnboundedReceiver<SessionCommand>,
) {
    while let Some(command) = inbox.recv().await {
        dispatch(&mut controller, command);
    }
    info!(
        "Session {} stopped in phase {}",
        controller.session().session_id,
        controller.phase()
    );
}

/// Applies one command to the controller. Replies to callers that have gone
/// away are dropped.
pub fn dispatch(controller: &mut PhaseController, command: SessionCommand) {
    match command {
        SessionCommand::Start { reply } => {
            let _ = reply.send(controller.start());
        }
        SessionCommand::Transition { phase, reply } => {
            let _ = reply.send(controller.transition_to(phase));
        }
        SessionCommand::NightAction {
            player_id,
            target_id,
            kind,
            reply,
        } => {
            let _ = reply.send(controller.submit_night_action(&player_id, &target_id, kind));
        }
        SessionCommand::Vote {
            voter_id,
            target,
            reply,
        } => {
            let _ = reply.send(controller.submit_vote(&voter_id, target));
        }
        SessionCommand::ForceVoting { reply } => {
            let _ = reply.send(controller.force_to_voting());
        }
        SessionCommand::End { reply } => {
            let _ = reply.send(controller.end_game());
        }
        SessionCommand::GetState { viewer, reply } => {
            let _ = reply.send(controller.get_state(viewer.as_deref()));
        }
        SessionCommand::Subscribe { reply } => {
            let _ = reply.send(controller.subscribe());
        }
        SessionCommand::TimerFired(token) => controller.on_timer(token),
    }
}

/// Running sessions keyed by room id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        session_id: &str,
        seats: &[Seat],
        options: SessionOptions,
    ) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }
        let handle = spawn_session(session_id.to_string(), seats, options)?;
        sessions.insert(session_id.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Drops the registry's handle. The task stops once no handle is left.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id).is_some();
        if removed {
            debug!("Removed session {} from registry", session_id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{event::GameEvent, game::Winner};
    use crate::services::{
        audit::TracingAuditSink, clock::ManualClock, role_distribution::BalancedDistribution,
    };
    use std::time::Duration;

    fn seats(n: usize) -> Vec<Seat> {
        (1..=n)
            .map(|i| Seat::new(i.to_string(), format!("Player{}", i)))
            .collect()
    }

    fn options(clock: Arc<ManualClock>) -> SessionOptions {
        SessionOptions {
            config: GameConfig {
                tick_seconds: 0,
                rng_seed: Some(3),
                ..GameConfig::default()
            },
            clock,
            audit: Arc::new(TracingAuditSink),
            snapshots: None,
            distribution: Arc::new(BalancedDistribution),
        }
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicates_and_small_rosters() {
        let registry = SessionRegistry::new();
        let clock = Arc::new(ManualClock::new());
        registry
            .create("1", &seats(5), options(clock.clone()))
            .await
            .unwrap();
        assert_eq!(
            registry
                .create("1", &seats(5), options(clock.clone()))
                .await
                .err(),
            Some(SessionError::AlreadyExists("1".to_string()))
        );
        assert!(matches!(
            registry.create("2", &seats(3), options(clock)).await,
            Err(SessionError::Distribution(_))
        ));
        assert_eq!(registry.len().await, 1);
        assert!(registry.remove("1").await);
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.get("1").await.err(),
            Some(SessionError::NotFound("1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_timers_drive_the_session_through_the_actor() {
        let clock = Arc::new(ManualClock::new());
        let handle = spawn_session("room".to_string(), &seats(6), options(clock.clone())).unwrap();

        assert!(handle.start().await.unwrap());
        assert_eq!(handle.state(None).await.unwrap().phase, GamePhase::RoleReveal);

        clock.advance(Duration::from_secs(10));
        let state = handle.state(None).await.unwrap();
        assert_eq!(state.phase, GamePhase::WerewolfKill);
        assert_eq!(state.day, 1);

        assert!(!handle.start().await.unwrap());
        assert!(handle.end().await.unwrap());
        let state = handle.state(None).await.unwrap();
        assert_eq!(state.phase, GamePhase::GameOver);
        assert_eq!(state.result.unwrap().winner, Winner::Aborted);
    }

    #[tokio::test]
    async fn test_subscribers_see_closed_once_every_handle_is_gone() {
        let registry = SessionRegistry::new();
        let clock = Arc::new(ManualClock::new());
        let handle = registry
            .create("room", &seats(5), options(clock))
            .await
            .unwrap();
        let mut events = handle.subscribe().await.unwrap();
        assert!(handle.start().await.unwrap());
        drop(handle);

        match events.recv().await.unwrap().event {
            GameEvent::PhaseChange { to_phase, .. } => assert_eq!(to_phase, GamePhase::RoleReveal),
            other => panic!("unexpected event {:?}", other),
        }

        assert!(registry.remove("room").await);
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Err(broadcast::error::RecvError::Closed) => break,
                    _ => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
