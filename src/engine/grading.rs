//! One grading transaction: optimistic local mutation, remote commit, and
//! rollback when the commit fails.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn, Instrument};

use super::card::CardRecord;
use super::meta::normalize;
use super::queue::Offset;
use super::rating::{Rating, RequeuePolicy};
use super::stats::{apply_rating, revert_rating, StatsSnapshot};
use super::{EngineError, EngineState, GradeOutcome, ReviewEngine};
use crate::upstream::SubmitRequest;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub rating: Rating,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl GradeRequest {
    pub fn new(rating: Rating) -> Self {
        Self { rating, duration_ms: None }
    }
}

/// What the optimistic step changed, kept so a failed commit can be undone.
#[derive(Debug)]
struct Pending {
    card: CardRecord,
    rating: Rating,
    prior: StatsSnapshot,
    epoch: u64,
}

/// Pop the head, requeue it per policy, and count the verdict.
/// Returns `None` (and changes nothing) when the queue is empty.
fn apply_optimistic(st: &mut EngineState, rating: Rating) -> Option<Pending> {
    let card = st.queue.pop_front()?;
    match rating.policy().requeue {
        RequeuePolicy::Graduate => {}
        RequeuePolicy::InsertAfter(n) => {
            st.queue.insert_at(card.requeued(rating), Offset::At(n));
        }
        RequeuePolicy::InsertAtEnd => {
            st.queue.insert_at(card.requeued(rating), Offset::End);
        }
    }
    let prior = st.stats;
    st.stats = apply_rating(&prior, rating, st.queue.len());
    st.last_result = None;
    st.grading = true;
    Some(Pending { card, rating, prior, epoch: st.epoch })
}

/// Put the original card back at the head and undo the counters. `streak` and
/// `total` are restored from the pre-grade snapshot since neither can be derived
/// by reverting the verdict.
fn roll_back(st: &mut EngineState, p: &Pending) {
    st.queue.remove(&p.card.key);
    st.queue.push_front(p.card.clone());

    let reverted = revert_rating(&st.stats, p.rating);
    debug_assert_eq!(
        (reverted.reviewed, reverted.correct, reverted.lapses, reverted.skipped),
        (p.prior.reviewed, p.prior.correct, p.prior.lapses, p.prior.skipped),
        "rollback counters diverged from the pre-grade snapshot"
    );
    st.stats = StatsSnapshot {
        streak: p.prior.streak,
        total: p.prior.total,
        ..reverted
    };
    let len = st.queue.len();
    st.stats.cover(len);
}

impl ReviewEngine {
    /// Grade the head card. A no-op returning `Ok(None)` on an empty queue.
    ///
    /// Only one grade may be in flight per engine; a concurrent call fails with
    /// `GradeInProgress` without touching anything. On commit failure the queue head
    /// and counters are restored and the error is returned.
    ///
    /// The transaction runs on its own task, so it commits or rolls back even when
    /// the caller stops waiting for it.
    pub async fn grade_card(self: &Arc<Self>, req: GradeRequest) -> Result<Option<GradeOutcome>, EngineError> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_grade(req).await }.in_current_span()).await?
    }

    #[instrument(level = "debug", target = "engine", skip(self), fields(key = %self.key))]
    async fn run_grade(&self, req: GradeRequest) -> Result<Option<GradeOutcome>, EngineError> {
        let Ok(gate) = self.grade_gate.try_lock() else {
            warn!(target: "engine", key = %self.key, rating = %req.rating, "Grade rejected; another grade is in flight");
            return Err(EngineError::GradeInProgress);
        };

        let (pending, submit) = {
            let mut st = self.state.lock().await;
            if st.closed {
                return Err(EngineError::Closed);
            }
            let Some(pending) = apply_optimistic(&mut st, req.rating) else {
                debug!(target: "engine", key = %self.key, "Grade on empty queue ignored");
                return Ok(None);
            };
            let submit = SubmitRequest {
                word_id: pending.card.word_id.clone(),
                result: req.rating.policy().result,
                progress_id: pending.card.progress_id.clone(),
                duration_ms: req.duration_ms,
                category_id: self.key.category.clone(),
            };
            self.publish(&st);
            (pending, submit)
        };

        let result = self.backend.submit_grade(&submit).await;

        let outcome = {
            let mut st = self.state.lock().await;
            st.grading = false;
            let superseded = st.epoch != pending.epoch;
            match result {
                Ok(resp) => {
                    if !st.closed {
                        st.meta = normalize(&resp.meta.unwrap_or_default(), &st.meta, false);
                    }
                    st.error = None;
                    let outcome = GradeOutcome {
                        success: true,
                        rating: req.rating,
                        payload: Some(resp.payload),
                        error: None,
                    };
                    st.last_result = Some(outcome.clone());
                    info!(
                        target: "engine",
                        key = %self.key,
                        card = %pending.card.key,
                        rating = %req.rating,
                        remaining = st.queue.len(),
                        reviewed = st.stats.reviewed,
                        streak = st.stats.streak,
                        "Grade committed"
                    );
                    self.publish(&st);
                    Ok(outcome)
                }
                Err(e) => {
                    if superseded {
                        warn!(target: "engine", key = %self.key, card = %pending.card.key, error = %e, "Grade failed after the session was replaced; nothing to roll back");
                    } else {
                        roll_back(&mut st, &pending);
                        warn!(target: "engine", key = %self.key, card = %pending.card.key, rating = %req.rating, error = %e, "Grade failed; rolled back");
                    }
                    let message = e.to_string();
                    st.error = Some(message.clone());
                    st.last_result = Some(GradeOutcome {
                        success: false,
                        rating: req.rating,
                        payload: None,
                        error: Some(message),
                    });
                    self.publish(&st);
                    Err(EngineError::GradeCommit { rating: req.rating, source: e })
                }
            }
        };
        drop(gate);

        let outcome = outcome?;
        if let Err(e) = self.top_up_if_needed().await {
            warn!(target: "engine", key = %self.key, error = %e, "Top-up after grade failed");
        }
        Ok(Some(outcome))
    }

    pub async fn skip_card(self: &Arc<Self>, duration_ms: Option<u64>) -> Result<Option<GradeOutcome>, EngineError> {
        self.grade_card(GradeRequest { rating: Rating::Skip, duration_ms }).await
    }
}
