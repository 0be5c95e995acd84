//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sitepress_static::{BuildConfig, BuildResult, PageAssembler};
use tower_http::services::ServeDir;

use crate::watcher::FileWatcher;
use crate::websocket::{
    inject_script, reload_client_script, reload_script_tag, ReloadHub, ReloadMessage,
    RELOAD_ENDPOINT, RELOAD_SCRIPT_PATH,
};

/// Produces a fresh full build of the site.
pub trait SiteBuilder: Send + Sync + 'static {
    fn rebuild(&self) -> Result<BuildResult, String>;
}

impl SiteBuilder for BuildConfig {
    fn rebuild(&self) -> Result<BuildResult, String> {
        PageAssembler::new(self.clone())
            .build()
            .map_err(|e| e.to_string())
    }
}

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub output_dir: PathBuf,

    /// Files and directories that trigger a rebuild
    pub watch: Vec<PathBuf>,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public_html"),
            watch: vec![PathBuf::from("templates")],
            port: 7777,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Shared server state.
struct ServerState {
    hub: ReloadHub,
}

/// Development server.
pub struct DevServer<B> {
    config: DevServerConfig,
    builder: Arc<B>,
}

impl<B: SiteBuilder> DevServer<B> {
    /// Create a new development server.
    pub fn new(config: DevServerConfig, builder: B) -> Self {
        Self {
            config,
            builder: Arc::new(builder),
        }
    }

    /// Build once, then serve and rebuild on every change until shut down.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let state = Arc::new(ServerState {
            hub: ReloadHub::new(),
        });

        rebuild(&self.builder, &state.hub).await;

        let (watcher, mut rx) = FileWatcher::new(&self.config.watch)
            .map_err(|e| ServerError::WatchError(e.to_string()))?;

        let builder = Arc::clone(&self.builder);
        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::info!("Changed: {}", event.path().display());

                // Coalesce queued changes into a single rebuild
                while rx.try_recv().is_ok() {}

                rebuild(&builder, &state_clone.hub).await;
            }
            // Keep watcher alive
            drop(watcher);
        });

        let app = router(&self.config.output_dir, state);

        tracing::info!("Starting dev server at http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        if self.config.open {
            let url = format!("http://{}", addr);
            let _ = open::that(&url);
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        Ok(())
    }
}

/// Routes for the reload socket and script, with the output tree as fallback.
fn router(output_dir: &Path, state: Arc<ServerState>) -> Router {
    Router::new()
        .route(RELOAD_ENDPOINT, get(ws_handler))
        .route(RELOAD_SCRIPT_PATH, get(script_handler))
        .fallback_service(ServeDir::new(output_dir))
        .layer(middleware::from_fn(inject_reload))
        .with_state(state)
}

/// Run a full rebuild on the blocking pool and notify browsers.
async fn rebuild<B: SiteBuilder>(builder: &Arc<B>, hub: &ReloadHub) {
    let builder = Arc::clone(builder);

    let result = tokio::task::spawn_blocking(move || builder.rebuild())
        .await
        .unwrap_or_else(|e| Err(format!("build task failed: {e}")));

    match result {
        Ok(result) => {
            tracing::info!("Rebuilt {} pages in {}ms", result.pages, result.duration_ms);
            hub.send(ReloadMessage::Reload);
        }
        Err(message) => {
            tracing::error!("Build failed: {}", message);
            hub.send(ReloadMessage::BuildFailed { message });
        }
    }
}

/// Inject the live reload client into served HTML pages.
async fn inject_reload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes), &reload_script_tag());
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

/// Handler for the live reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_ws(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut rx = state.hub.subscribe();

    if send_message(&mut socket, &ReloadMessage::Connected)
        .await
        .is_err()
    {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if send_message(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

/// Handler for the live reload client script.
async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(),
    )
}
