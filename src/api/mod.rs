//! HTTP and WebSocket transport for download commands and status events.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /api/health` | liveness |
//! | `GET /api/downloads` | active sessions |
//! | `POST /api/downloads` | start a download (body: [`StartRequest`]) |
//! | `DELETE /api/downloads/{id}` | cancel a download |
//! | `GET /api/events` | WebSocket stream of `add-download` / `update-download` |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::{Any, CorsLayer};

use crate::events::{DownloadEvent, EventReceiver, SessionStatus};
use crate::media::{SessionId, StartRequest};
use crate::{AppConfig, Downloader};

/// Capacity of the event fan-out buffer per subscriber.
const EVENT_BUFFER: usize = 1024;

/// How long shutdown waits for cancelled sessions to remove their files.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    downloader: Arc<Downloader>,
    events: broadcast::Sender<DownloadEvent>,
}

#[derive(Serialize)]
struct CommandResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<SessionId>,
}

impl CommandResponse {
    const fn ok(id: Option<SessionId>) -> Self {
        Self { status: "ok", id }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
}

#[derive(Serialize)]
struct SessionSummary {
    id: SessionId,
    status: SessionStatus,
}

async fn api_health() -> impl IntoResponse {
    axum::Json(CommandResponse::ok(None))
}

async fn api_list(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<_> = state
        .downloader
        .registry()
        .list()
        .into_iter()
        .map(|(id, status)| SessionSummary { id, status })
        .collect();
    axum::Json(sessions)
}

async fn api_start(
    State(state): State<AppState>,
    axum::Json(request): axum::Json<StartRequest>,
) -> axum::response::Response {
    match state.downloader.start_download(request) {
        Ok(handle) => axum::Json(CommandResponse::ok(Some(handle.id()))).into_response(),
        Err(e) => {
            log::warn!("Rejected start request: {e}");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                axum::Json(ErrorResponse {
                    status: "error",
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn api_cancel(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    // Cancelling is forgiving: unknown or malformed ids still answer ok.
    if let Ok(id) = id.parse::<SessionId>() {
        state.downloader.cancel_download(id);
    }
    axum::Json(CommandResponse::ok(None))
}

async fn api_events(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, rx))
}

async fn forward_events(mut socket: WebSocket, mut rx: broadcast::Receiver<DownloadEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to encode event: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Event subscriber lagged, {skipped} event(s) dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Builds the router around a downloader and an event fan-out.
pub fn router(downloader: Arc<Downloader>, events: broadcast::Sender<DownloadEvent>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/downloads", get(api_list).post(api_start))
        .route("/api/downloads/{id}", delete(api_cancel))
        .route("/api/events", get(api_events))
        .layer(cors)
        .with_state(AppState { downloader, events })
}

/// Forwards session events into a broadcast channel until the session side closes.
pub fn spawn_event_fanout(mut rx: EventReceiver) -> broadcast::Sender<DownloadEvent> {
    let (tx, _) = broadcast::channel(EVENT_BUFFER);
    let fanout = tx.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            // No subscribers is fine; the event is simply not observed.
            let _ = fanout.send(event);
        }
    });
    tx
}

/// Runs the API server until Ctrl-C, then cancels every active download.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server(config: AppConfig) -> crate::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .map_err(|e| crate::Error::Api(format!("invalid address: {e}")))?;

    let downloader = Arc::new(Downloader::from_config(config, tx)?);
    let events = spawn_event_fanout(rx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("API server listening on {addr}");

    serve(listener, downloader, events, async {
        let _ = tokio::signal::ctrl_c().await;
        log::info!("Received SIGINT, shutting down");
    })
    .await
}

/// Serves the API on `listener` until `signal` resolves, then cancels every session
/// and waits for their cleanup.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: tokio::net::TcpListener,
    downloader: Arc<Downloader>,
    events: broadcast::Sender<DownloadEvent>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> crate::Result<()> {
    let app = router(Arc::clone(&downloader), events);
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;

    if !downloader.shutdown(SHUTDOWN_GRACE).await {
        log::warn!("Exiting with sessions still running; temporary files may remain");
    }
    Ok(())
}
