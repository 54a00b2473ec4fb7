//! The HTTP/WebSocket surface (§6 "downstream, not specified here"): read
//! views (competition, per-trader status), control (start/stop/remove),
//! and decision-log retrieval. Reuses the teacher's `AppState`/
//! `create_router`/`ws_handler` replay-then-broadcast shape, generalized
//! from a single-process backtest API to the multi-trader control plane.

pub mod error;
pub mod types;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub use error::{Error, Result};
use types::{DecisionLogQuery, UserScopeQuery};

use app_config::types::ServerSettings;
use core_types::TraderConfig;
use database::{CycleRecord, Db};
use engine::{CompetitionEntry, Manager, TraderView};
use events::WsMessage;

type WsCache = Arc<Mutex<VecDeque<WsMessage>>>;
const WS_CACHE_SIZE: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub db: Db,
    pub ws_tx: broadcast::Sender<WsMessage>,
    pub ws_cache: WsCache,
}

pub fn create_router(app_state: AppState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let api_router = Router::new()
        .route("/traders", get(list_traders_handler).post(add_trader_handler))
        .route("/traders/{id}", get(get_trader_handler).delete(remove_trader_handler))
        .route("/traders/{id}/start", post(start_trader_handler))
        .route("/traders/{id}/stop", post(stop_trader_handler))
        .route("/traders/{id}/decisions", get(decisions_handler))
        .route("/competition", get(competition_handler));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn health_check_handler() -> &'static str {
    "OK"
}

async fn list_traders_handler(
    State(state): State<AppState>,
    Query(scope): Query<UserScopeQuery>,
) -> Json<Vec<TraderView>> {
    let views = match scope.user {
        Some(user) => state.manager.list_for(&user).await,
        None => state.manager.list().await,
    };
    Json(views)
}

async fn add_trader_handler(
    State(state): State<AppState>,
    Json(config): Json<TraderConfig>,
) -> Result<impl IntoResponse> {
    state.manager.add(config).await?;
    Ok(axum::http::StatusCode::CREATED)
}

async fn get_trader_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<TraderView>> {
    Ok(Json(state.manager.get(&id).await?))
}

async fn remove_trader_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state.manager.remove(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn start_trader_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state.manager.start(&id).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

async fn stop_trader_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state.manager.stop(&id).await?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

async fn competition_handler(State(state): State<AppState>) -> Json<Vec<CompetitionEntry>> {
    Json(state.manager.competition_view().await)
}

async fn decisions_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DecisionLogQuery>,
) -> Result<Json<Vec<CycleRecord>>> {
    let records = match (query.from, query.to) {
        (Some(from), Some(to)) => state.db.cycles_in_range(&id, from, to).await?,
        _ => state.db.recent_cycles(&id, query.limit.unwrap_or(50)).await?,
    };
    Ok(Json(records))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let replay: Vec<_> = {
        let cache = state.ws_cache.lock().expect("ws cache mutex poisoned");
        cache.iter().cloned().collect()
    };
    for msg in replay {
        let Ok(json_msg) = serde_json::to_string(&msg) else { continue };
        if socket.send(Message::Text(json_msg.into())).await.is_err() {
            return;
        }
    }

    let mut rx = state.ws_tx.subscribe();
    loop {
        tokio::select! {
            Ok(msg) = rx.recv() => {
                let Ok(json_msg) = serde_json::to_string(&msg) else { continue };
                if socket.send(Message::Text(json_msg.into())).await.is_err() {
                    break;
                }
            }
            Some(Ok(msg)) = socket.next() => {
                if let Message::Close(_) = msg {
                    break;
                }
            }
            else => break,
        }
    }
}

/// Spawns the task that feeds every broadcast message into the bounded
/// replay cache, so a client connecting mid-session still sees recent
/// history before going live.
fn spawn_cache_feeder(ws_tx: broadcast::Sender<WsMessage>, ws_cache: WsCache) {
    let mut rx = ws_tx.subscribe();
    tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            let mut cache = ws_cache.lock().expect("ws cache mutex poisoned");
            cache.push_back(msg);
            while cache.len() > WS_CACHE_SIZE {
                cache.pop_front();
            }
        }
    });
}

/// Runs the HTTP/WebSocket surface until the process is terminated.
pub async fn run(
    settings: ServerSettings,
    manager: Arc<Manager>,
    db: Db,
    ws_tx: broadcast::Sender<WsMessage>,
) -> Result<()> {
    let ws_cache: WsCache = Arc::new(Mutex::new(VecDeque::with_capacity(WS_CACHE_SIZE)));
    spawn_cache_feeder(ws_tx.clone(), ws_cache.clone());

    let app_state = AppState { manager, db, ws_tx, ws_cache };
    let app = create_router(app_state);

    let address = format!("{}:{}", settings.host, settings.port);
    tracing::info!("Web server listening on {}", address);

    let listener = TcpListener::bind(&address).await?;

    axum::serve(listener, app.into_make_service())
        .await
        .expect("axum server crashed");

    Ok(())
}
