//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Resolving the engine for a (mode, category) pairing and lazily loading it
//!   - Running refresh/grade/skip and answering with the resulting view
//!   - Mapping engine failures onto HTTP status codes

use axum::{
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::domain::EngineKey;
use crate::engine::fetch::FetchOutcome;
use crate::engine::grading::GradeRequest;
use crate::engine::{EngineError, EngineView};
use crate::protocol::ErrorOut;
use crate::state::AppState;

/// Current view of the engine, loading the first batch if needed. A failed first
/// load is reported through `view.error` so the client can retry.
#[instrument(level = "info", skip(state, key), fields(%key))]
pub async fn session_view(state: &AppState, key: EngineKey) -> EngineView {
  let engine = state.engine(key).await;
  if let Err(e) = engine.ensure_started().await {
    warn!(target: "quizdeck_backend", key = %engine.key(), error = %e, "Initial queue load failed");
  }
  engine.view().await
}

#[instrument(level = "info", skip(state, key), fields(%key))]
pub async fn do_refresh(state: &AppState, key: EngineKey, reset: bool) -> Result<EngineView, EngineError> {
  let engine = state.engine(key).await;
  match engine.refresh(reset).await? {
    FetchOutcome::Applied { added, remaining } => {
      info!(target: "quizdeck_backend", key = %engine.key(), reset, added, remaining, "Refresh applied");
    }
    other => {
      info!(target: "quizdeck_backend", key = %engine.key(), reset, outcome = ?other, "Refresh not applied");
    }
  }
  Ok(engine.view().await)
}

#[instrument(level = "info", skip(state, key), fields(%key, rating = %req.rating))]
pub async fn do_grade(state: &AppState, key: EngineKey, req: GradeRequest) -> Result<EngineView, EngineError> {
  let engine = state.engine(key).await;
  engine.ensure_started().await?;
  engine.grade_card(req).await?;
  Ok(engine.view().await)
}

pub async fn do_skip(state: &AppState, key: EngineKey, duration_ms: Option<u64>) -> Result<EngineView, EngineError> {
  let engine = state.engine(key).await;
  engine.ensure_started().await?;
  engine.skip_card(duration_ms).await?;
  Ok(engine.view().await)
}

#[instrument(level = "info", skip(state, key), fields(%key))]
pub async fn do_close(state: &AppState, key: EngineKey) -> bool {
  let closed = state.close_engine(&key).await;
  info!(target: "quizdeck_backend", %key, closed, "Session close requested");
  closed
}

/// Error body for the HTTP API: `{ "message": ... }` with a status per failure kind.
#[derive(Debug)]
pub enum ApiError {
  Engine(EngineError),
  BadRequest(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Engine(EngineError::GradeInProgress) => StatusCode::CONFLICT,
      ApiError::Engine(EngineError::Closed) => StatusCode::GONE,
      ApiError::Engine(EngineError::Fetch(_) | EngineError::GradeCommit { .. }) => StatusCode::BAD_GATEWAY,
      ApiError::Engine(EngineError::Task(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn message(&self) -> String {
    match self {
      ApiError::Engine(e) => e.to_string(),
      ApiError::BadRequest(m) => m.clone(),
    }
  }
}

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    ApiError::Engine(e)
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self {
    ApiError::BadRequest(r.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self {
    ApiError::BadRequest(r.body_text())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      warn!(target: "quizdeck_backend", %status, message = %self.message(), "Request failed");
    }
    (status, Json(ErrorOut { message: self.message() })).into_response()
  }
}
