//! Scripted in-memory backend for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use super::{EngineSettings, ReviewEngine};
use crate::domain::{EngineKey, Mode};
use crate::upstream::{
    ListRequest, ListResponse, ReviewBackend, SubmitRequest, SubmitResponse, UpstreamError,
};

/// Pages and submit results are served in order; once a script runs dry, lists
/// return an empty page and submits succeed with an empty body.
#[derive(Default)]
pub struct FakeBackend {
    pages: Mutex<VecDeque<Result<ListResponse, String>>>,
    submits: Mutex<VecDeque<Result<Value, String>>>,
    list_calls: Mutex<Vec<ListRequest>>,
    submit_calls: Mutex<Vec<SubmitRequest>>,
    list_gate: Option<Arc<Notify>>,
    submit_gate: Option<Arc<Notify>>,
}

pub fn page(ids: &[&str]) -> ListResponse {
    ListResponse {
        items: ids.iter().map(|id| json!({ "id": id, "term": format!("term-{id}") })).collect(),
        meta: None,
    }
}

pub fn page_with_meta(ids: &[&str], meta: Value) -> ListResponse {
    ListResponse {
        meta: Some(serde_json::from_value(meta).unwrap()),
        ..page(ids)
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, p: ListResponse) -> Self {
        self.pages.lock().unwrap().push_back(Ok(p));
        self
    }

    pub fn with_list_error(self, msg: &str) -> Self {
        self.pages.lock().unwrap().push_back(Err(msg.to_string()));
        self
    }

    pub fn with_submit(self, body: Value) -> Self {
        self.submits.lock().unwrap().push_back(Ok(body));
        self
    }

    pub fn with_submit_error(self, msg: &str) -> Self {
        self.submits.lock().unwrap().push_back(Err(msg.to_string()));
        self
    }

    /// Lists block until the returned handle is notified.
    pub fn gate_lists(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.list_gate = Some(gate.clone());
        (self, gate)
    }

    /// Submits block until the returned handle is notified.
    pub fn gate_submits(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn push_page(&self, p: ListResponse) {
        self.pages.lock().unwrap().push_back(Ok(p));
    }

    pub fn list_calls(&self) -> Vec<ListRequest> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> Vec<SubmitRequest> {
        self.submit_calls.lock().unwrap().clone()
    }

    /// Yield until `n` list requests have reached the backend.
    pub async fn lists_reached(&self, n: usize) {
        while self.list_calls.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Yield until `n` submits have reached the backend.
    pub async fn submits_reached(&self, n: usize) {
        while self.submit_calls.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl ReviewBackend for FakeBackend {
    async fn list_queue(&self, req: &ListRequest) -> Result<ListResponse, UpstreamError> {
        self.list_calls.lock().unwrap().push(req.clone());
        if let Some(gate) = &self.list_gate {
            gate.notified().await;
        }
        let next = self.pages.lock().unwrap().pop_front();
        match next {
            Some(Ok(p)) => Ok(p),
            Some(Err(msg)) => Err(UpstreamError::Rejected(msg)),
            None => Ok(ListResponse::default()),
        }
    }

    async fn submit_grade(&self, req: &SubmitRequest) -> Result<SubmitResponse, UpstreamError> {
        self.submit_calls.lock().unwrap().push(req.clone());
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        let next = self.submits.lock().unwrap().pop_front();
        match next {
            Some(Ok(body)) => crate::upstream::parse_submit_body(body),
            Some(Err(msg)) => Err(UpstreamError::Rejected(msg)),
            None => Ok(SubmitResponse::default()),
        }
    }
}

/// Learn-mode engine over `fake` with the given page size and default refill rules.
pub fn engine_with(fake: &Arc<FakeBackend>, limit: usize) -> Arc<ReviewEngine> {
    engine_with_settings(fake, EngineSettings { limit, min_top_up: 3, restart_on_complete: false })
}

pub fn engine_with_settings(fake: &Arc<FakeBackend>, settings: EngineSettings) -> Arc<ReviewEngine> {
    Arc::new(ReviewEngine::new(EngineKey::new(Mode::Learn, Some("food".into())), settings, fake.clone()))
}
