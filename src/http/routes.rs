//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::model::{Game, GameMode};
use crate::game::GameError;
use crate::util::time::uptime_secs;
use crate::ws::ws_handler;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CLIENT_ORIGIN may list several origins, comma separated
    let allow_origin = match &state.config.client_origin {
        Some(origins) => AllowOrigin::list(
            origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok()),
        ),
        None => AllowOrigin::from(Any),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/games", post(create_game_handler))
        .route("/games/:id", get(snapshot_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
    active_participants: usize,
    stored_games: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.games.registry();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: registry.active_games(),
        active_participants: registry.total_participants(),
        stored_games: state.store.game_count(),
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateGameRequest {
    mode: GameMode,
    #[serde(default)]
    bots: usize,
}

#[derive(Debug, Serialize)]
struct CreateGameResponse {
    game_id: Uuid,
    mode: GameMode,
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> (StatusCode, Json<CreateGameResponse>) {
    let game_id = state.games.create_game(req.mode, req.bots);
    (
        StatusCode::CREATED,
        Json(CreateGameResponse {
            game_id,
            mode: req.mode,
        }),
    )
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Game>, AppError> {
    Ok(Json(state.games.snapshot(game_id)?))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable")]
    Unavailable,
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::Validation(_) => AppError::BadRequest(err.to_string()),
            GameError::NotFound(_) => AppError::NotFound(err.to_string()),
            GameError::Phase(_) | GameError::AlreadyStarted => AppError::Conflict(err.to_string()),
            GameError::Unavailable => AppError::Unavailable,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "try again".to_string()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{BalanceConfig, Config};
    use crate::game::model::GameStatus;
    use crate::store::{EphemeralStore, MemoryArchive};

    fn state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            log_format: Default::default(),
            round_deadline: Duration::from_secs(30),
            snapshot_ttl: Duration::from_secs(3600),
            store_sweep_interval: Duration::from_secs(60),
            checkpoint_every_rounds: 0,
            balance_path: None,
            supabase: None,
            client_origin: None,
        };
        AppState::new(
            config,
            BalanceConfig::default(),
            Arc::new(EphemeralStore::new(Duration::from_secs(3600))),
            Arc::new(MemoryArchive::new()),
        )
    }

    #[tokio::test]
    async fn created_game_is_readable() {
        let state = state();
        let (status, Json(created)) = create_game_handler(
            State(state.clone()),
            Json(CreateGameRequest {
                mode: GameMode::Skirmish,
                bots: 2,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let Json(game) = snapshot_handler(State(state.clone()), Path(created.game_id))
            .await
            .unwrap();
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.characters.len(), 2);

        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.active_games, 1);
        assert_eq!(health.stored_games, 1);
    }

    #[tokio::test]
    async fn unknown_game_is_404() {
        let err = snapshot_handler(State(state()), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn game_errors_map_to_statuses() {
        let cases = [
            (GameError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (GameError::Phase("x".into()), StatusCode::CONFLICT),
            (GameError::AlreadyStarted, StatusCode::CONFLICT),
            (GameError::Unavailable, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
