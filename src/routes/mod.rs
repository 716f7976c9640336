//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws?mode=..&category=..` (view pushes + commands)
/// - Session API under `/api/v1/session[...]`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/api/v1/session",
            get(http::http_get_session).delete(http::http_delete_session),
        )
        .route("/api/v1/session/refresh", post(http::http_post_refresh))
        .route("/api/v1/session/grade", post(http::http_post_grade))
        .route("/api/v1/session/skip", post(http::http_post_skip))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    use super::*;
    use crate::config::QueueConfig;
    use crate::engine::fake::{page, FakeBackend};

    fn app(fake: FakeBackend) -> (Arc<FakeBackend>, Router) {
        let fake = Arc::new(fake);
        let state = Arc::new(AppState::with_backend(QueueConfig::default(), fake.clone()));
        (fake, build_router(state))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (_, app) = app(FakeBackend::new());
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn session_view_and_grade_flow() {
        let (fake, app) = app(FakeBackend::new().with_page(page(&["a", "b", "c", "d", "e", "f"])));
        let (status, view) = call(&app, Method::GET, "/api/v1/session?mode=learn&category=food", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["phase"], "ready");
        assert_eq!(view["currentCard"]["key"], "a");
        assert_eq!(view["stats"]["total"], 6);

        let grade = json!({ "mode": "learn", "category": "food", "rating": "again", "durationMs": 800 });
        let (status, view) = call(&app, Method::POST, "/api/v1/session/grade", Some(grade)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["currentCard"]["key"], "b");
        assert_eq!(view["stats"]["lapses"], 1);
        assert_eq!(view["lastResult"]["success"], true);
        assert_eq!(fake.submit_calls()[0].duration_ms, Some(800));
    }

    #[tokio::test]
    async fn failed_commit_maps_to_bad_gateway() {
        let (_, app) = app(FakeBackend::new().with_page(page(&["a", "b"])).with_submit_error("nope"));
        let grade = json!({ "mode": "review", "rating": "good" });
        let (status, body) = call(&app, Method::POST, "/api/v1/session/grade", Some(grade)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["message"].as_str().unwrap().contains("nope"));

        let (_, view) = call(&app, Method::GET, "/api/v1/session?mode=review", None).await;
        assert_eq!(view["currentCard"]["key"], "a");
        assert_eq!(view["stats"]["reviewed"], 0);
        assert_eq!(view["lastResult"]["success"], false);
    }

    #[tokio::test]
    async fn bad_input_is_400() {
        let (_, app) = app(FakeBackend::new());
        let (status, body) = call(&app, Method::GET, "/api/v1/session?mode=cram", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let grade = json!({ "mode": "learn", "rating": "meh" });
        let (status, _) = call(&app, Method::POST, "/api/v1/session/grade", Some(grade)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_closes_the_session() {
        let (fake, app) = app(FakeBackend::new().with_page(page(&["a"])).with_page(page(&["z"])));
        call(&app, Method::GET, "/api/v1/session?mode=learn", None).await;

        let (status, body) = call(&app, Method::DELETE, "/api/v1/session?mode=learn", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "closed": true }));
        let (_, body) = call(&app, Method::DELETE, "/api/v1/session?mode=learn", None).await;
        assert_eq!(body, json!({ "closed": false }));

        // a fresh engine starts a fresh session
        let (_, view) = call(&app, Method::GET, "/api/v1/session?mode=learn", None).await;
        assert_eq!(view["currentCard"]["key"], "z");
        assert_eq!(fake.list_calls().len(), 2);
    }

    type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve(fake: FakeBackend) -> (Arc<FakeBackend>, SocketAddr) {
        let (fake, app) = app(fake);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (fake, addr)
    }

    async fn next_json(ws: &mut Ws) -> Value {
        loop {
            let msg = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
            if let WsMessage::Text(txt) = msg {
                return serde_json::from_str(&txt).unwrap();
            }
        }
    }

    /// Skip pushed views until one matches.
    async fn view_where(ws: &mut Ws, pred: impl Fn(&Value) -> bool) -> Value {
        loop {
            let msg = next_json(ws).await;
            if msg["type"] == "view" && pred(&msg["view"]) {
                return msg["view"].clone();
            }
        }
    }

    async fn send(ws: &mut Ws, v: Value) {
        ws.send(WsMessage::Text(v.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn socket_pushes_views_and_answers_commands() {
        let (fake, addr) = serve(FakeBackend::new().with_page(page(&["a", "b", "c", "d", "e", "f"]))).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws?mode=learn&category=food")).await.unwrap();

        let first = next_json(&mut ws).await;
        assert_eq!(first["type"], "view");
        assert_eq!(first["view"]["currentCard"]["key"], "a");
        assert_eq!(first["view"]["phase"], "ready");

        send(&mut ws, json!({ "type": "ping" })).await;
        assert_eq!(next_json(&mut ws).await, json!({ "type": "pong" }));

        send(&mut ws, json!({ "type": "grade", "rating": "meh" })).await;
        let err = next_json(&mut ws).await;
        assert_eq!(err["type"], "error");
        assert!(err["message"].as_str().unwrap().starts_with("Invalid JSON"));

        send(&mut ws, json!({ "type": "grade", "rating": "good", "durationMs": 700 })).await;
        let view = view_where(&mut ws, |v| v["lastResult"]["success"] == true).await;
        assert_eq!(view["currentCard"]["key"], "b");
        assert_eq!(fake.submit_calls()[0].duration_ms, Some(700));

        // changes made over HTTP reach the socket too
        let grade = json!({ "mode": "learn", "category": "food", "rating": "again" });
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/v1/session/grade"))
            .json(&grade)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let view = view_where(&mut ws, |v| v["stats"]["lapses"] == 1).await;
        assert_eq!(view["currentCard"]["key"], "c");
    }

    #[tokio::test]
    async fn socket_follows_replacement_engine_after_delete() {
        let (fake, addr) = serve(FakeBackend::new().with_page(page(&["a"])).with_page(page(&["z"]))).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws?mode=learn")).await.unwrap();
        assert_eq!(next_json(&mut ws).await["view"]["currentCard"]["key"], "a");

        let resp = reqwest::Client::new()
            .delete(format!("http://{addr}/api/v1/session?mode=learn"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({ "closed": true }));

        send(&mut ws, json!({ "type": "ping" })).await;
        let view = view_where(&mut ws, |v| v["currentCard"]["key"] == "z").await;
        assert_eq!(view["phase"], "ready");
        assert_eq!(fake.list_calls().len(), 2);
    }
}
