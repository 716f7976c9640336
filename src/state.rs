//! Application state: the upstream backend, queue tuning, and the engine registry.
//!
//! This module owns:
//!   - one `ReviewEngine` per (mode, category) pairing, created on first use
//!   - the shared `ReviewBackend` every engine talks to
//!   - the queue configuration engines are built from
//!
//! Engines never share queues or counters; the registry only hands out handles.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{QueueConfig, ServiceConfig};
use crate::domain::EngineKey;
use crate::engine::{EngineSettings, ReviewEngine};
use crate::upstream::{ReviewBackend, UpstreamClient, UpstreamError};

#[derive(Clone)]
pub struct AppState {
    pub engines: Arc<RwLock<HashMap<EngineKey, Arc<ReviewEngine>>>>,
    pub backend: Arc<dyn ReviewBackend>,
    pub queue: QueueConfig,
}

impl AppState {
    /// Build state from config: upstream HTTP client plus an empty registry.
    #[instrument(level = "info", skip_all)]
    pub fn new(cfg: &ServiceConfig) -> Result<Self, UpstreamError> {
        let client = UpstreamClient::from_config(&cfg.upstream)?;
        info!(
            target: "quizdeck_backend",
            base_url = %client.base_url,
            list_path = %client.list_path,
            submit_path = %client.submit_path,
            authenticated = cfg.upstream.token.is_some(),
            "Upstream client ready"
        );
        info!(
            target: "quizdeck_backend",
            learn_limit = cfg.queue.limit_for(crate::domain::Mode::Learn),
            review_limit = cfg.queue.limit_for(crate::domain::Mode::Review),
            min_top_up = cfg.queue.min_top_up,
            restart_on_complete = cfg.queue.restart_on_complete,
            "Queue settings"
        );
        Ok(Self::with_backend(cfg.queue.clone(), Arc::new(client)))
    }

    pub fn with_backend(queue: QueueConfig, backend: Arc<dyn ReviewBackend>) -> Self {
        Self {
            engines: Arc::new(RwLock::new(HashMap::new())),
            backend,
            queue,
        }
    }

    /// Engine for `key`, created on first use.
    #[instrument(level = "debug", skip(self, key), fields(%key))]
    pub async fn engine(&self, key: EngineKey) -> Arc<ReviewEngine> {
        if let Some(e) = { self.engines.read().await.get(&key).cloned() } {
            return e;
        }
        let mut engines = self.engines.write().await;
        engines
            .entry(key.clone())
            .or_insert_with(|| {
                let settings = EngineSettings::for_mode(&self.queue, key.mode);
                info!(target: "engine", %key, limit = settings.limit, "Engine created");
                Arc::new(ReviewEngine::new(key.clone(), settings, self.backend.clone()))
            })
            .clone()
    }

    /// Close and forget the engine for `key`. Returns whether one existed.
    #[instrument(level = "debug", skip(self, key), fields(%key))]
    pub async fn close_engine(&self, key: &EngineKey) -> bool {
        let removed = { self.engines.write().await.remove(key) };
        match removed {
            Some(engine) => {
                engine.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every engine (shutdown path).
    pub async fn close_all(&self) {
        let engines: Vec<_> = { self.engines.write().await.drain().map(|(_, e)| e).collect() };
        for e in &engines {
            e.close().await;
        }
        info!(target: "quizdeck_backend", closed = engines.len(), "All engines closed");
    }
}
