//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{EngineKey, Mode};
use crate::engine::rating::Rating;
use crate::engine::EngineView;

/// Messages the client can send over WebSocket. The socket is bound to one engine.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Refresh {
        #[serde(default)]
        reset: bool,
    },
    Grade {
        rating: Rating,
        #[serde(default, rename = "durationMs")]
        duration_ms: Option<u64>,
    },
    Skip {
        #[serde(default, rename = "durationMs")]
        duration_ms: Option<u64>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    View { view: EngineView },
    Error { message: String },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub mode: Mode,
    #[serde(default)]
    pub category: Option<String>,
}

impl SessionQuery {
    pub fn key(&self) -> EngineKey {
        EngineKey::new(self.mode, self.category.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshIn {
    pub mode: Mode,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub reset: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeIn {
    pub mode: Mode,
    #[serde(default)]
    pub category: Option<String>,
    pub rating: Rating,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipIn {
    pub mode: Mode,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct ClosedOut {
    pub closed: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
