//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Malformed query strings and bodies come back as 400 with a `{message}` body.

use std::sync::Arc;
use axum::{
  extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
  response::IntoResponse,
  Json,
};
use tracing::instrument;

use crate::domain::EngineKey;
use crate::engine::grading::GradeRequest;
use crate::engine::EngineView;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip_all)]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<EngineView> {
  let Query(q) = q?;
  Ok(Json(session_view(&state, q.key()).await))
}

#[instrument(level = "info", skip_all)]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<ClosedOut> {
  let Query(q) = q?;
  let closed = do_close(&state, q.key()).await;
  Ok(Json(ClosedOut { closed }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_refresh(
  State(state): State<Arc<AppState>>,
  body: Result<Json<RefreshIn>, JsonRejection>,
) -> ApiResult<EngineView> {
  let Json(body) = body?;
  let key = EngineKey::new(body.mode, body.category);
  Ok(Json(do_refresh(&state, key, body.reset).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_grade(
  State(state): State<Arc<AppState>>,
  body: Result<Json<GradeIn>, JsonRejection>,
) -> ApiResult<EngineView> {
  let Json(body) = body?;
  let key = EngineKey::new(body.mode, body.category);
  let req = GradeRequest { rating: body.rating, duration_ms: body.duration_ms };
  Ok(Json(do_grade(&state, key, req).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_skip(
  State(state): State<Arc<AppState>>,
  body: Result<Json<SkipIn>, JsonRejection>,
) -> ApiResult<EngineView> {
  let Json(body) = body?;
  let key = EngineKey::new(body.mode, body.category);
  Ok(Json(do_skip(&state, key, body.duration_ms).await?))
}
