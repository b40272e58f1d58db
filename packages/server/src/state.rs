use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

use crate::models::{config::GameConfig, room::Room};
use crate::services::{
    audit::{AuditSink, SnapshotStore, SnapshotWriter, TracingAuditSink},
    clock::{Clock, TokioClock},
    role_distribution::{BalancedDistribution, RoleDistribution},
    session_actor::{SessionOptions, SessionRegistry},
};

const SNAPSHOT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<Mutex<HashMap<String, Room>>>,
    pub sessions: SessionRegistry,
    pub game_config: Arc<GameConfig>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
    pub distribution: Arc<dyn RoleDistribution>,
    pub snapshot_store: Option<Arc<dyn SnapshotStore>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(GameConfig::from_env())
    }

    pub fn with_config(game_config: GameConfig) -> Self {
        AppState {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            sessions: SessionRegistry::new(),
            game_config: Arc::new(game_config),
            clock: Arc::new(TokioClock),
            audit: Arc::new(TracingAuditSink),
            distribution: Arc::new(BalancedDistribution),
            snapshot_store: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Collaborators for a new session. Spawns the snapshot writer, so this
    /// must run inside the tokio runtime.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            config: self.game_config.as_ref().clone(),
            clock: self.clock.clone(),
            audit: self.audit.clone(),
            snapshots: self
                .snapshot_store
                .clone()
                .map(|store| SnapshotWriter::spawn(store, SNAPSHOT_BUFFER)),
            distribution: self.distribution.clone(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
