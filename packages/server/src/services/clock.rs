use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Source of time and one-shot timers for a session.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Runs `callback` once after `delay` unless the handle is cancelled first.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Wall-clock timers on the tokio runtime. `after` must be called from
/// within a runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.swap(true, Ordering::SeqCst) {
                callback();
            }
        });
        TimerHandle {
            cancelled,
            task: Some(task.abort_handle()),
        }
    }
}

struct Pending {
    due: Duration,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

struct ManualState {
    start: DateTime<Utc>,
    elapsed: Duration,
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Virtual clock that only moves when `advance` is called.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                start: Utc::now(),
                elapsed: Duration::ZERO,
                next_seq: 0,
                pending: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves time forward, firing due timers in deadline order. Returns how
    /// many callbacks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().elapsed + by;
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.lock();
                let index = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                match index {
                    Some(i) => {
                        let pending = state.pending.remove(i);
                        state.elapsed = pending.due;
                        Some(pending)
                    }
                    None => {
                        state.elapsed = target;
                        None
                    }
                }
            };
            let Some(pending) = next else {
                break;
            };
            if !pending.cancelled.swap(true, Ordering::SeqCst) {
                (pending.callback)();
                fired += 1;
            }
        }
        fired
    }

    /// Number of timers still waiting to fire.
    pub fn pending(&self) -> usize {
        self.lock()
            .pending
            .iter()
            .filter(|p| !p.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let state = self.lock();
        state.start + chrono::Duration::milliseconds(state.elapsed.as_millis() as i64)
    }

    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.elapsed + delay;
        state.pending.push(Pending {
            due,
            seq,
            cancelled: cancelled.clone(),
            callback,
        });
        TimerHandle {
            cancelled,
            task: None,
        }
    }
}
