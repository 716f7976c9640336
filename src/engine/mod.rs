//! Review/learning queue engine.
//!
//! One `ReviewEngine` owns the working set of cards, the session counters and the
//! gamification snapshot for a single (mode, category) pairing. All state lives
//! behind one async mutex that is never held across a network call, so every
//! mutation runs to completion before another can observe the state.
//!
//!   - `fetch`   : single-flight queue loading and threshold top-ups
//!   - `grading` : optimistic grade, remote commit, rollback on failure
//!
//! Every committed mutation publishes a fresh `EngineView` on a watch channel;
//! the HTTP/WS layer reads views instead of holding on to engine internals.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::domain::{EngineKey, Mode};
use crate::upstream::{ReviewBackend, UpstreamError};

pub mod card;
pub mod fetch;
pub mod grading;
pub mod meta;
pub mod queue;
pub mod rating;
pub mod stats;

#[cfg(test)]
pub(crate) mod fake;

use card::CardRecord;
use meta::SessionMeta;
use queue::QueueStore;
use rating::Rating;
use stats::StatsSnapshot;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("queue fetch failed: {0}")]
    Fetch(#[source] UpstreamError),
    #[error("grade '{rating}' was not committed: {source}")]
    GradeCommit {
        rating: Rating,
        #[source]
        source: UpstreamError,
    },
    #[error("another grade is still in flight")]
    GradeInProgress,
    #[error("engine has been closed")]
    Closed,
    #[error("engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Structural state of a session. Errors never get a phase of their own.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Grading,
    Complete,
}

/// Result of the most recently committed grading transaction.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub success: bool,
    pub rating: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the UI layer reads from an engine.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineView {
    pub mode: Mode,
    pub category: Option<String>,
    pub session_id: Uuid,
    pub phase: Phase,
    pub current_card: Option<CardRecord>,
    pub remaining: usize,
    pub stats: StatsSnapshot,
    pub session_meta: SessionMeta,
    pub last_result: Option<GradeOutcome>,
    pub is_session_complete: bool,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub limit: usize,
    pub min_top_up: usize,
    pub restart_on_complete: bool,
}

impl EngineSettings {
    pub fn for_mode(cfg: &QueueConfig, mode: Mode) -> Self {
        Self {
            limit: cfg.limit_for(mode),
            min_top_up: cfg.min_top_up,
            restart_on_complete: cfg.restart_on_complete,
        }
    }
}

#[derive(Debug)]
struct EngineState {
    queue: QueueStore,
    stats: StatsSnapshot,
    meta: SessionMeta,
    last_result: Option<GradeOutcome>,
    error: Option<String>,
    loading: bool,
    grading: bool,
    /// At least one fetch has been applied.
    loaded: bool,
    /// Bumped by every reset fetch and by `close`; in-flight work that captured an
    /// older epoch must not touch the queue.
    epoch: u64,
    closed: bool,
    session_id: Uuid,
}

impl EngineState {
    fn new() -> Self {
        Self {
            queue: QueueStore::new(),
            stats: StatsSnapshot::default(),
            meta: SessionMeta::default(),
            last_result: None,
            error: None,
            loading: false,
            grading: false,
            loaded: false,
            epoch: 0,
            closed: false,
            session_id: Uuid::new_v4(),
        }
    }

    fn is_session_complete(&self) -> bool {
        !self.loading && self.queue.is_empty() && self.stats.reviewed > 0
    }

    fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.grading {
            Phase::Grading
        } else if self.is_session_complete() {
            Phase::Complete
        } else if !self.loaded {
            Phase::Idle
        } else {
            Phase::Ready
        }
    }

    fn view(&self, key: &EngineKey) -> EngineView {
        EngineView {
            mode: key.mode,
            category: key.category.clone(),
            session_id: self.session_id,
            phase: self.phase(),
            current_card: self.queue.head().cloned(),
            remaining: self.queue.len(),
            stats: self.stats,
            session_meta: self.meta.clone(),
            last_result: self.last_result.clone(),
            is_session_complete: self.is_session_complete(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }
}

pub struct ReviewEngine {
    key: EngineKey,
    settings: EngineSettings,
    backend: Arc<dyn ReviewBackend>,
    state: Mutex<EngineState>,
    /// Single-flight flag for `fetch_queue`.
    inflight: AtomicBool,
    /// Held for the whole of one grading transaction.
    grade_gate: Mutex<()>,
    changes: watch::Sender<EngineView>,
}

impl ReviewEngine {
    pub fn new(key: EngineKey, settings: EngineSettings, backend: Arc<dyn ReviewBackend>) -> Self {
        let state = EngineState::new();
        let (changes, _) = watch::channel(state.view(&key));
        Self {
            key,
            settings,
            backend,
            state: Mutex::new(state),
            inflight: AtomicBool::new(false),
            grade_gate: Mutex::new(()),
            changes,
        }
    }

    pub fn key(&self) -> &EngineKey {
        &self.key
    }

    #[allow(dead_code)]
    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub async fn view(&self) -> EngineView {
        self.state.lock().await.view(&self.key)
    }

    /// Receivers see a new view after every committed mutation.
    pub fn subscribe(&self) -> watch::Receiver<EngineView> {
        self.changes.subscribe()
    }

    #[allow(dead_code)]
    pub async fn current_card(&self) -> Option<CardRecord> {
        self.state.lock().await.queue.head().cloned()
    }

    #[allow(dead_code)]
    pub async fn stats(&self) -> StatsSnapshot {
        self.state.lock().await.stats
    }

    #[allow(dead_code)]
    pub async fn session_meta(&self) -> SessionMeta {
        self.state.lock().await.meta.clone()
    }

    #[allow(dead_code)]
    pub async fn last_result(&self) -> Option<GradeOutcome> {
        self.state.lock().await.last_result.clone()
    }

    #[allow(dead_code)]
    pub async fn is_session_complete(&self) -> bool {
        self.state.lock().await.is_session_complete()
    }

    /// Load the first batch if nothing has been loaded yet.
    pub async fn ensure_started(self: &Arc<Self>) -> Result<(), EngineError> {
        let needs_load = {
            let st = self.state.lock().await;
            !st.loaded && !st.loading
        };
        if needs_load {
            self.fetch_queue(true).await?;
        }
        Ok(())
    }

    /// Stop applying results of in-flight work and refuse further commands.
    pub async fn close(&self) {
        let mut st = self.state.lock().await;
        st.closed = true;
        st.epoch += 1;
        st.loading = false;
        info!(target: "engine", key = %self.key, session = %st.session_id, "Engine closed");
        self.publish(&st);
    }

    fn publish(&self, st: &EngineState) {
        self.changes.send_replace(st.view(&self.key));
    }
}
