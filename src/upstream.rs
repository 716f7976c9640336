//! REST client for the vocabulary server: queue listing/refill and grade submission.
//!
//! The engine only sees the `ReviewBackend` trait; `UpstreamClient` is the reqwest
//! implementation used in production. Calls are instrumented and log latencies and
//! item counts (not contents).
//!
//! NOTE: We never log the bearer token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::UpstreamConfig;
use crate::domain::Mode;
use crate::engine::meta::RawSessionMeta;
use crate::engine::rating::ResultKind;
use crate::util::trunc_for_log;

#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("upstream HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("invalid upstream payload: {0}")]
  Decode(String),
  #[error("{0}")]
  Rejected(String),
}

/// List/refill request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListRequest {
  pub mode: Mode,
  pub limit: usize,
  pub category: Option<String>,
  pub reset_session: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListResponse {
  pub items: Vec<Value>,
  pub meta: Option<RawSessionMeta>,
}

/// Grade submission body.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
  pub word_id: String,
  pub result: ResultKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub progress_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SubmitResponse {
  pub meta: Option<RawSessionMeta>,
  /// Full response body, handed to the UI as grade feedback.
  pub payload: Value,
}

/// The two remote operations the engine consumes.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
  async fn list_queue(&self, req: &ListRequest) -> Result<ListResponse, UpstreamError>;
  async fn submit_grade(&self, req: &SubmitRequest) -> Result<SubmitResponse, UpstreamError>;
}

#[derive(Clone)]
pub struct UpstreamClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub list_path: String,
  pub submit_path: String,
  pub user_agent: String,
  token: Option<String>,
}

impl UpstreamClient {
  pub fn from_config(cfg: &UpstreamConfig) -> Result<Self, UpstreamError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
      .build()?;

    Ok(Self {
      client,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      list_path: cfg.list_path.clone(),
      submit_path: cfg.submit_path.clone(),
      user_agent: cfg.user_agent.clone(),
      token: cfg.token.clone(),
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  fn decorate(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let rb = rb.header(USER_AGENT, &self.user_agent).header(ACCEPT, "application/json");
    match &self.token {
      Some(t) => rb.header(AUTHORIZATION, format!("Bearer {}", t)),
      None => rb,
    }
  }

  /// Send, check status, and parse the body as JSON.
  async fn send_json(&self, rb: reqwest::RequestBuilder) -> Result<Value, UpstreamError> {
    let res = self.decorate(rb).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_error_message(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(UpstreamError::Status { status, message });
    }

    let text = res.text().await?;
    if text.trim().is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))
  }
}

#[async_trait]
impl ReviewBackend for UpstreamClient {
  #[instrument(level = "info", target = "upstream", skip(self, req), fields(mode = %req.mode, limit = req.limit, reset = req.reset_session))]
  async fn list_queue(&self, req: &ListRequest) -> Result<ListResponse, UpstreamError> {
    let limit = req.limit.to_string();
    let reset = req.reset_session.to_string();
    let mut query: Vec<(&str, &str)> = vec![
      ("mode", req.mode.as_str()),
      ("limit", &limit),
      ("resetSession", &reset),
    ];
    if let Some(c) = &req.category {
      query.push(("category", c));
    }

    let start = Instant::now();
    let result = self
      .send_json(self.client.get(self.url(&self.list_path)).query(&query))
      .await
      .and_then(|body| parse_list_body(&body));
    let elapsed = start.elapsed();

    match &result {
      Ok(r) => info!(target: "upstream", ?elapsed, items = r.items.len(), has_meta = r.meta.is_some(), "Queue page received"),
      Err(e) => error!(target: "upstream", ?elapsed, error = %e, "Queue request failed"),
    }
    result
  }

  #[instrument(level = "info", target = "upstream", skip(self, req), fields(word_id = %req.word_id, result = ?req.result))]
  async fn submit_grade(&self, req: &SubmitRequest) -> Result<SubmitResponse, UpstreamError> {
    let start = Instant::now();
    let result = self
      .send_json(self.client.post(self.url(&self.submit_path)).json(req))
      .await
      .and_then(parse_submit_body);
    let elapsed = start.elapsed();

    match &result {
      Ok(r) => info!(target: "upstream", ?elapsed, has_meta = r.meta.is_some(), "Grade committed"),
      Err(e) => error!(target: "upstream", ?elapsed, error = %e, "Grade submission failed"),
    }
    result
  }
}

/// `{ items: [...], session | meta: {...} }`; a missing `items` is an empty page.
pub fn parse_list_body(body: &Value) -> Result<ListResponse, UpstreamError> {
  let items = match body.get("items") {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Array(items)) => items.clone(),
    Some(other) => return Err(UpstreamError::Decode(format!("`items` is not an array: {}", trunc_for_log(&other.to_string(), 80)))),
  };
  Ok(ListResponse { items, meta: meta_of(body)? })
}

/// A 2xx body may still carry an explicit `success: false` / `ok: false` verdict.
pub fn parse_submit_body(body: Value) -> Result<SubmitResponse, UpstreamError> {
  let refused = ["success", "ok"]
    .iter()
    .any(|k| body.get(*k).and_then(Value::as_bool) == Some(false));
  if refused {
    let message = body
      .get("message")
      .and_then(Value::as_str)
      .unwrap_or("grade rejected by server")
      .to_string();
    return Err(UpstreamError::Rejected(message));
  }
  let meta = meta_of(&body)?;
  Ok(SubmitResponse { meta, payload: body })
}

/// The meta payload lives under `session` or `meta`; `session` wins.
pub fn meta_of(body: &Value) -> Result<Option<RawSessionMeta>, UpstreamError> {
  let raw = ["session", "meta"]
    .iter()
    .filter_map(|k| body.get(*k))
    .find(|v| v.is_object());
  match raw {
    Some(v) => serde_json::from_value(v.clone())
      .map(Some)
      .map_err(|e| UpstreamError::Decode(e.to_string())),
    None => Ok(None),
  }
}

/// Try to extract a clean error message from an error body.
fn extract_error_message(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum ErrField { Text(String), Obj { message: String } }
  #[derive(Deserialize)]
  struct EWrap {
    #[serde(default)] message: Option<String>,
    #[serde(default)] error: Option<ErrField>,
  }
  let w = serde_json::from_str::<EWrap>(body).ok()?;
  if let Some(m) = w.message {
    return Some(m);
  }
  match w.error? {
    ErrField::Text(s) => Some(s),
    ErrField::Obj { message } => Some(message),
  }
}
