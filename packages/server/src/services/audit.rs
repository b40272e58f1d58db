use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::game::GameSession;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("snapshot store failed: {0}")]
    Store(String),
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub session_id: String,
    pub player_id: String,
    pub action: String,
    pub target: Option<String>,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        session_id: &str,
        player_id: &str,
        action: impl Into<String>,
        target: Option<&str>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            player_id: player_id.to_string(),
            action: action.into(),
            target: target.map(str::to_string),
            result: result.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Fire-and-forget record of every submitted action. Errors never affect the
/// game.
pub trait AuditSink: Send + Sync {
    fn log_action(&self, record: AuditRecord) -> Result<(), AuditError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_action(&self, record: AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "audit",
            "session={} player={} action={} target={:?} result={}",
            record.session_id, record.player_id, record.action, record.target, record.result
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_action(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|e| AuditError::Unavailable(e.to_string()))?
            .push(record);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: GameSession,
    pub taken_at: DateTime<Utc>,
}

/// Durable storage for session snapshots. Called off the game task.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistError>;
}

/// Keeps the latest snapshot per session as JSON.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, session_id: &str) -> Option<serde_json::Value> {
        self.latest
            .lock()
            .ok()
            .and_then(|m| m.get(session_id).cloned())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistError> {
        let value = serde_json::to_value(snapshot)?;
        self.latest
            .lock()
            .map_err(|e| PersistError::Store(e.to_string()))?
            .insert(snapshot.session.session_id.clone(), value);
        Ok(())
    }
}

/// Writes `<dir>/<session_id>.json`, replacing the previous snapshot.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}.json", snapshot.session.session_id));
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Buffered hand-off to a background writer so a slow store never stalls a
/// session.
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::Sender<SessionSnapshot>,
}

impl SnapshotWriter {
    /// Starts the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn SnapshotStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SessionSnapshot>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                let store = store.clone();
                let session_id = snapshot.session.session_id.clone();
                match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
                    Ok(Ok(())) => debug!("Saved snapshot for session {}", session_id),
                    Ok(Err(e)) => warn!("Snapshot for session {} failed: {}", session_id, e),
                    Err(e) => warn!("Snapshot task for session {} panicked: {}", session_id, e),
                }
            }
        });
        Self { tx }
    }

    /// Queues a snapshot. Drops it with a warning when the buffer is full.
    pub fn submit(&self, session: &GameSession) {
        let snapshot = SessionSnapshot {
            session: session.clone(),
            taken_at: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(snapshot) {
            warn!(
                "Dropping snapshot for session {}: {}",
                session.session_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{player::Player, role::Role};
    use std::time::Duration;

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn save(&self, _snapshot: &SessionSnapshot) -> Result<(), PersistError> {
            Err(PersistError::Store("disk full".to_string()))
        }
    }

    fn session() -> GameSession {
        GameSession::new(
            "room-1".to_string(),
            vec![Player::new("1".to_string(), "Alice".to_string(), Role::Seer)],
        )
    }

    #[tokio::test]
    async fn test_snapshot_writer_saves_latest() {
        let store = Arc::new(MemorySnapshotStore::new());
        let writer = SnapshotWriter::spawn(store.clone(), 8);
        writer.submit(&session());

        for _ in 0..50 {
            if store.latest("room-1").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let saved = store.latest("room-1").unwrap();
        assert_eq!(saved["session"]["session_id"], "room-1");
    }

    #[tokio::test]
    async fn test_failing_store_does_not_block_submit() {
        let writer = SnapshotWriter::spawn(Arc::new(FailingStore), 1);
        for _ in 0..10 {
            writer.submit(&session());
        }
    }

    #[test]
    fn test_memory_audit_sink_records() {
        let sink = MemoryAuditSink::new();
        sink.log_action(AuditRecord::new("room", "1", "vote", Some("2"), "accepted"))
            .unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target.as_deref(), Some("2"));
    }
}
