//! WebSocket upgrade + message loop. A socket is bound to one engine via the
//! query string; every committed change of that engine is pushed as a `view`
//! message, and client commands are forwarded to core logic.

use std::sync::Arc;
use axum::{
  extract::{
    rejection::QueryRejection,
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::{IntoResponse, Response},
};
use tracing::{debug, error, info, instrument};

use crate::domain::EngineKey;
use crate::engine::grading::GradeRequest;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage, SessionQuery};
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  q: Result<Query<SessionQuery>, QueryRejection>,
) -> Response {
  let key = match q {
    Ok(Query(q)) => q.key(),
    Err(e) => return ApiError::from(e).into_response(),
  };
  info!(target: "quizdeck_backend", %key, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, key))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state, key), fields(%key))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, key: EngineKey) {
  info!(target: "quizdeck_backend", %key, "WebSocket connected");
  let mut engine = state.engine(key.clone()).await;
  let mut changes = engine.subscribe();

  // every mutation publishes, so the latest published view is the loaded state
  session_view(&state, key.clone()).await;
  let first = ServerWsMessage::View { view: changes.borrow_and_update().clone() };
  if socket.send(Message::Text(encode(&first))).await.is_err() {
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        let reply = match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(cmd) => {
              debug!(target: "quizdeck_backend", "WS received: {:?}", &cmd);
              handle_client_ws(cmd, &state, &key).await
            }
            Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
          },
          Message::Ping(payload) => {
            let _ = socket.send(Message::Pong(payload)).await;
            None
          }
          Message::Close(_) => break,
          _ => None,
        };
        if let Some(reply) = reply {
          if let Err(e) = socket.send(Message::Text(encode(&reply))).await {
            error!(target: "quizdeck_backend", error = %e, "WS send error");
            break;
          }
        }
        // the session may have been closed over HTTP and replaced by a new engine
        let current = state.engine(key.clone()).await;
        if !Arc::ptr_eq(&current, &engine) {
          debug!(target: "quizdeck_backend", %key, "WS following replacement engine");
          engine = current;
          changes = engine.subscribe();
          session_view(&state, key.clone()).await;
          let view = changes.borrow_and_update().clone();
          if socket.send(Message::Text(encode(&ServerWsMessage::View { view }))).await.is_err() {
            break;
          }
        }
      }
      changed = changes.changed() => {
        if changed.is_err() {
          break;
        }
        let view = changes.borrow_and_update().clone();
        if let Err(e) = socket.send(Message::Text(encode(&ServerWsMessage::View { view }))).await {
          error!(target: "quizdeck_backend", error = %e, "WS send error");
          break;
        }
      }
    }
  }
  info!(target: "quizdeck_backend", %key, "WebSocket disconnected");
}

/// Successful commands answer through the change stream; only pongs and
/// failures get a direct reply.
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, key: &EngineKey) -> Option<ServerWsMessage> {
  let result = match msg {
    ClientWsMessage::Ping => return Some(ServerWsMessage::Pong),
    ClientWsMessage::Refresh { reset } => do_refresh(state, key.clone(), reset).await,
    ClientWsMessage::Grade { rating, duration_ms } => {
      do_grade(state, key.clone(), GradeRequest { rating, duration_ms }).await
    }
    ClientWsMessage::Skip { duration_ms } => do_skip(state, key.clone(), duration_ms).await,
  };
  result.err().map(|e| ServerWsMessage::Error { message: e.to_string() })
}
