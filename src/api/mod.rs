//! JSON HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /` and `GET /health`
//! - `POST /api/signup`, `POST /api/login`
//! - `GET|POST /api/todos`, `PUT|DELETE /api/todos/{id}` (bearer token required)

mod accounts;
pub mod error;
pub mod extract;
pub mod todos;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use chrono::{FixedOffset, Offset, Utc};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::auth::TokenIssuer;
use crate::config::{ServerConfig, TodoConfig};
use crate::error::{Result, TodoError};
use crate::store::SqliteStore;

pub use error::ApiError;
pub use todos::{TodoView, format_due_date, parse_due_date};

/// Shared request state.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SqliteStore>,
    pub tokens: TokenIssuer,
    /// Offset the client's naive due dates are written in.
    pub client_offset: FixedOffset,
}

impl ApiState {
    pub fn new(store: Arc<SqliteStore>, tokens: TokenIssuer, todos: &TodoConfig) -> Self {
        Self {
            store,
            tokens,
            client_offset: client_offset(todos),
        }
    }

    /// Run `f` against the store on the blocking pool. A write may sit in
    /// SQLite's busy timeout while a sibling process holds the lock.
    pub(crate) async fn on_store<T, F>(&self, f: F) -> std::result::Result<T, ApiError>
    where
        F: FnOnce(&SqliteStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(ApiError::internal)
    }
}

fn client_offset(config: &TodoConfig) -> FixedOffset {
    let secs = config.due_date_utc_offset_minutes.saturating_mul(60);
    FixedOffset::east_opt(secs).unwrap_or_else(|| {
        warn!(
            minutes = config.due_date_utc_offset_minutes,
            "due date offset out of range; using UTC"
        );
        Utc.fix()
    })
}

/// Build the API router over `state`.
pub fn router(state: ApiState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/signup", post(accounts::signup))
        .route("/api/login", post(accounts::login))
        .route(
            "/api/todos",
            get(todos::list_todos).post(todos::create_todo),
        )
        .route(
            "/api/todos/{id}",
            put(todos::update_todo).delete(todos::delete_todo),
        )
        .layer(cors)
        .with_state(state)
}

/// CORS policy for the configured origins. `"*"` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o.trim() == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, "ignoring invalid CORS origin: {e}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

async fn index() -> &'static str {
    "ProTodo Backend v1.0 Running!"
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Running HTTP server.
pub struct ApiServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl ApiServer {
    /// Start the API server.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(state: ApiState, config: &ServerConfig) -> Result<Self> {
        let app = router(state, cors_layer(&config.cors_origins));

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TodoError::Server(format!("API server bind to {bind_addr} failed: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| TodoError::Server(format!("failed to get local addr: {e}")))?;

        info!("API server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
