//! HTTP transport: JSON-RPC over POST, live scene streams over SSE, and /health.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use store_counter::SessionRegistry;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::protocol::validator::parse_session_id;
use crate::protocol::ProtocolHandler;
use crate::session::tenant::TenantRegistry;
use crate::types::{error_codes, mcp_error_codes, JsonRpcMessage, McpError, McpResult};

/// Server operating mode.
pub enum ServerMode {
    /// Single-user: one session registry, one handler.
    Single(Arc<ProtocolHandler>),
    /// Multi-tenant: one session registry per `X-User-ID`.
    MultiTenant {
        registry: Arc<Mutex<TenantRegistry>>,
    },
}

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub token: Option<String>,
    pub mode: ServerMode,
}

/// HTTP transport for web clients and dashboards.
pub struct SseTransport {
    state: Arc<ServerState>,
}

impl SseTransport {
    /// Single-user transport without auth.
    pub fn new(handler: ProtocolHandler) -> Self {
        Self::with_config(None, ServerMode::Single(Arc::new(handler)))
    }

    pub fn with_config(token: Option<String>, mode: ServerMode) -> Self {
        Self {
            state: Arc::new(ServerState { token, mode }),
        }
    }

    /// Build the router. Exposed for in-process tests.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/mcp", post(handle_request))
            .route("/sessions/:id/live", get(handle_live))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(cors))
            .with_state(state)
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        axum::serve(listener, app)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}

fn rpc_failure(status: StatusCode, code: i32, message: String) -> Response {
    (
        status,
        AxumJson(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": code, "message": message }
        })),
    )
        .into_response()
}

/// Checks the Bearer token if one is configured. /health bypasses this layer.
async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.token {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected);

        if !authorized {
            return rpc_failure(
                StatusCode::UNAUTHORIZED,
                mcp_error_codes::UNAUTHORIZED,
                "Unauthorized".to_string(),
            );
        }
    }

    next.run(request).await
}

/// Session registry of the caller, routed by `X-User-ID` in multi-tenant mode.
async fn resolve_registry(
    state: &ServerState,
    headers: &HeaderMap,
) -> Result<Arc<SessionRegistry>, Response> {
    match &state.mode {
        ServerMode::Single(handler) => Ok(handler.registry().clone()),
        ServerMode::MultiTenant { registry } => {
            let user_id = headers
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    rpc_failure(
                        StatusCode::BAD_REQUEST,
                        mcp_error_codes::USER_NOT_FOUND,
                        "Missing X-User-ID header (required in multi-tenant mode)".to_string(),
                    )
                })?;

            let mut tenants = registry.lock().await;
            tenants.get_or_create(user_id).map_err(|e| {
                let status = match &e {
                    McpError::InvalidParams(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                rpc_failure(status, e.code(), e.to_string())
            })
        }
    }
}

/// Handle JSON-RPC requests.
async fn handle_request(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    AxumJson(body): AxumJson<serde_json::Value>,
) -> Result<AxumJson<serde_json::Value>, Response> {
    let handler = match &state.mode {
        ServerMode::Single(handler) => handler.clone(),
        ServerMode::MultiTenant { .. } => {
            Arc::new(ProtocolHandler::new(resolve_registry(&state, &headers).await?))
        }
    };

    let msg: JsonRpcMessage = serde_json::from_value(body).map_err(|_| {
        rpc_failure(
            StatusCode::BAD_REQUEST,
            error_codes::PARSE_ERROR,
            "Parse error".to_string(),
        )
    })?;

    match handler.handle_message(msg).await {
        Some(response) => Ok(AxumJson(response)),
        None => Ok(AxumJson(serde_json::Value::Null)),
    }
}

/// Stream a session's scene state as SSE `scene` events.
///
/// The current state is sent first, then one event per published change.
/// The stream ends after the final state of an ended session.
async fn handle_live(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, Response> {
    let registry = resolve_registry(&state, &headers).await?;
    let id = parse_session_id(&id)
        .map_err(|e| rpc_failure(StatusCode::BAD_REQUEST, e.code(), e.to_string()))?;
    let session = registry.get(id).map_err(|e| {
        let e = McpError::from(e);
        rpc_failure(StatusCode::NOT_FOUND, e.code(), e.to_string())
    })?;

    let mut rx = session.subscribe();
    tracing::debug!("Live subscriber attached to session {id}");

    let stream = async_stream::stream! {
        let initial = rx.borrow_and_update().clone();
        if let Ok(data) = serde_json::to_string(&initial) {
            yield Ok(Event::default().event("scene").data(data));
        }
        let mut open = !session.is_closed();
        while open && rx.changed().await.is_ok() {
            let scene = rx.borrow_and_update().clone();
            if let Ok(data) = serde_json::to_string(&scene) {
                yield Ok(Event::default().event("scene").data(data));
            }
            open = !session.is_closed();
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Health check endpoint, no auth required.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<serde_json::Value> {
    let mut health = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });

    match &state.mode {
        ServerMode::Single(handler) => {
            let sessions = handler.registry().list();
            health["sessions"] = json!(sessions.len());
            health["live_sessions"] = json!(sessions.iter().filter(|s| s.live).count());
        }
        ServerMode::MultiTenant { registry } => {
            let tenants = registry.lock().await;
            health["users"] = json!(tenants.count());
        }
    }

    AxumJson(health)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use store_counter::{AgeBand, DetectionEvent, EngineConfig, Gender, SourceKind};
    use tower::ServiceExt;

    fn transport(token: Option<&str>) -> (SseTransport, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new(EngineConfig::default()).unwrap());
        let handler = ProtocolHandler::new(registry.clone());
        let transport = SseTransport::with_config(
            token.map(str::to_string),
            ServerMode::Single(Arc::new(handler)),
        );
        (transport, registry)
    }

    #[tokio::test]
    async fn test_health_skips_auth() {
        let (transport, _) = transport(Some("s3cret"));
        let resp = transport
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mcp_requires_token() {
        let (transport, _) = transport(Some("s3cret"));
        let request = Request::post("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .unwrap();
        let resp = transport.router().oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_live_stream_of_ended_session_terminates() {
        let (transport, registry) = transport(None);
        let session = registry.start_session(SourceKind::Webcam).unwrap();
        session
            .ingest(&DetectionEvent::new("1", 0, AgeBand::From18To34, Gender::Female))
            .unwrap();
        session.end();

        let uri = format!("/sessions/{}/live", session.id());
        let resp = transport
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("event: scene"), "{text}");
        assert!(text.contains("\"sealed\":true"), "{text}");
    }

    #[tokio::test]
    async fn test_live_stream_unknown_session() {
        let (transport, _) = transport(None);
        let uri = format!("/sessions/{}/live", store_counter::SessionId::new());
        let resp = transport
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
