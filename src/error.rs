use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    // --- infrastructure ---
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker {worker_id} failed batch {batch_id}: {message}")]
    Worker {
        worker_id: usize,
        batch_id: u64,
        message: String,
    },

    #[error("Data source error: {0}")]
    DataSource(String),

    // --- data absence ---
    #[error("No box score for player {pid} in game {esbid}")]
    NoBoxScore { esbid: String, pid: String },

    #[error("No finalized game found for esbid {0}")]
    NoFinalizedGame(String),

    #[error("No plays found for esbid {0}")]
    NoPlays(String),

    #[error("No plays involving player {pid} in game {esbid}")]
    NoPlaysForPlayer { esbid: String, pid: String },

    #[error("No team stats for {team} in game {esbid}")]
    NoTeamStats { esbid: String, team: String },

    // --- mapping / schema drift ---
    #[error("Metric column '{column}' missing from {record}; available columns: [{}]", .available.join(", "))]
    MissingColumn {
        column: String,
        record: &'static str,
        available: Vec<String>,
    },

    // --- domain validation ---
    #[error("Unknown selection type: {0}")]
    UnknownSelectionType(String),

    #[error("Selection type {selection} not allowed for market type {market_type}")]
    SelectionNotAllowed {
        selection: String,
        market_type: String,
    },

    #[error("Team {team} did not play in game {esbid} ({away} @ {home})")]
    TeamNotInGame {
        team: String,
        esbid: String,
        home: String,
        away: String,
    },

    #[error("Invalid team code: {0}")]
    InvalidTeamCode(String),

    #[error("Unknown calculation type for market type {0}")]
    UnknownCalculationType(String),

    #[error("Market {0} requires a metric line")]
    MissingLine(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Market {0} requires a selection_pid")]
    MissingSelectionPid(String),

    // --- dispatch ---
    #[error("Unsupported market type: {0}")]
    UnsupportedMarketType(String),

    #[error("No handler registered for {0}")]
    HandlerNotRegistered(String),

    #[error("Handler panicked while settling {0}")]
    HandlerPanicked(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMarketType(_) | AppError::UnknownSelectionType(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
