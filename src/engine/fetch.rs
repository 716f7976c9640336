//! Queue loading: single-flight fetches with reset-vs-merge semantics, and the
//! threshold rule that tops the queue up after a grade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::card::cards_from_items;
use super::meta::normalize;
use super::stats::StatsSnapshot;
use super::{EngineError, EngineSettings, ReviewEngine};
use crate::upstream::ListRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { added: usize, remaining: usize },
    /// Another fetch was already running; nothing was requested.
    AlreadyInFlight,
    /// The engine was closed while the request was out; the page was dropped.
    Discarded,
}

/// What `top_up_if_needed` decided to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopUp {
    Nothing,
    Refill,
    Restart,
}

pub fn top_up_threshold(limit: usize, min_top_up: usize) -> usize {
    min_top_up.max(limit / 2)
}

/// An empty queue after reviewing something is a completed session; it only
/// restarts on its own when configured to.
pub fn top_up_decision(remaining: usize, reviewed: u32, settings: &EngineSettings) -> TopUp {
    if remaining == 0 {
        if reviewed == 0 || settings.restart_on_complete {
            TopUp::Restart
        } else {
            TopUp::Nothing
        }
    } else if remaining < top_up_threshold(settings.limit, settings.min_top_up) {
        TopUp::Refill
    } else {
        TopUp::Nothing
    }
}

/// Clears the single-flight flag however the fetch ends.
struct InflightGuard<'a>(&'a AtomicBool);

impl<'a> InflightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReviewEngine {
    /// Caller-facing `refresh`; see `fetch_queue`.
    pub async fn refresh(self: &Arc<Self>, reset: bool) -> Result<FetchOutcome, EngineError> {
        self.fetch_queue(reset).await
    }

    /// Fetch one page. With `reset` the queue, counters and meta start over;
    /// otherwise new cards are appended behind the current ones.
    ///
    /// The fetch runs on its own task: a caller that stops waiting does not
    /// stop the fetch, so `loading` is always settled.
    pub async fn fetch_queue(self: &Arc<Self>, reset: bool) -> Result<FetchOutcome, EngineError> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_fetch(reset).await }.in_current_span()).await?
    }

    #[instrument(level = "debug", target = "engine", skip(self), fields(key = %self.key))]
    async fn run_fetch(&self, reset: bool) -> Result<FetchOutcome, EngineError> {
        let Some(_inflight) = InflightGuard::acquire(&self.inflight) else {
            debug!(target: "engine", key = %self.key, reset, "Fetch already in flight; dropping request");
            return Ok(FetchOutcome::AlreadyInFlight);
        };

        let epoch = {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(EngineError::Closed);
            }
            st.loading = true;
            st.error = None;
            self.publish(&st);
            st.epoch
        };

        let req = ListRequest {
            mode: self.key.mode,
            limit: self.settings.limit,
            category: self.key.category.clone(),
            reset_session: reset,
        };
        let result = self.backend.list_queue(&req).await;

        let mut st = self.state.lock().await;
        if st.closed || st.epoch != epoch {
            info!(target: "engine", key = %self.key, reset, "Engine closed during fetch; discarding page");
            return Ok(FetchOutcome::Discarded);
        }
        st.loading = false;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(target: "engine", key = %self.key, reset, error = %e, "Queue fetch failed");
                st.error = Some(e.to_string());
                self.publish(&st);
                return Err(EngineError::Fetch(e));
            }
        };

        let cards = cards_from_items(&resp.items);
        let raw_meta = resp.meta.unwrap_or_default();
        let added = st.queue.merge(cards, reset);
        if reset {
            st.stats = StatsSnapshot::fresh(st.queue.len());
            st.meta = normalize(&raw_meta, &st.meta, true);
            st.last_result = None;
            st.epoch += 1;
            st.session_id = Uuid::new_v4();
        } else {
            let len = st.queue.len();
            st.stats.cover(len);
            st.meta = normalize(&raw_meta, &st.meta, false);
        }
        st.loaded = true;

        let remaining = st.queue.len();
        info!(
            target: "engine",
            key = %self.key,
            session = %st.session_id,
            reset,
            received = resp.items.len(),
            added,
            remaining,
            "Queue page applied"
        );
        self.publish(&st);
        Ok(FetchOutcome::Applied { added, remaining })
    }

    /// Run after every successful grade, from inside the grading task.
    pub(super) async fn top_up_if_needed(&self) -> Result<Option<FetchOutcome>, EngineError> {
        let decision = {
            let st = self.state.lock().await;
            top_up_decision(st.queue.len(), st.stats.reviewed, &self.settings)
        };
        match decision {
            TopUp::Nothing => Ok(None),
            TopUp::Refill => self.run_fetch(false).await.map(Some),
            TopUp::Restart => {
                info!(target: "engine", key = %self.key, "Queue empty; starting a new batch");
                self.run_fetch(true).await.map(Some)
            }
        }
    }
}
