use crate::error::{AppError, Result};

/// Channel capacity for internal message routing (result writer, worker queue).
pub const CHANNEL_CAPACITY: usize = 1024;

/// Worker count used when WORKER_COUNT is unset.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Markets per worker batch when BATCH_SIZE is unset.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// NFL quarters that make up each half. Overtime (quarter 5) belongs to neither.
pub const FIRST_HALF_QUARTERS: [u8; 2] = [1, 2];
pub const SECOND_HALF_QUARTERS: [u8; 2] = [3, 4];

/// Closed set of team codes accepted by team-aggregate markets.
pub const NFL_TEAM_CODES: &[&str] = &[
    "ARI", "ATL", "BAL", "BUF", "CAR", "CHI", "CIN", "CLE", "DAL", "DEN", "DET", "GB", "HOU",
    "IND", "JAX", "KC", "LA", "LAC", "LV", "MIA", "MIN", "NE", "NO", "NYG", "NYJ", "PHI", "PIT",
    "SEA", "SF", "TB", "TEN", "WAS",
];

pub fn is_valid_team_code(code: &str) -> bool {
    NFL_TEAM_CODES.contains(&code)
}

/// How the runner distributes a settlement pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    /// Orchestrator over the SQLite data source, lazily cached per game.
    Direct,
    /// Preload a snapshot and fan batches out to the worker pool.
    Workers,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Port for /health and /stats/latency. 0 disables the HTTP server.
    pub api_port: u16,
    pub mode: SettleMode,
    /// Worker pool size (WORKER_COUNT)
    pub worker_count: usize,
    /// Markets per worker batch (BATCH_SIZE)
    pub batch_size: usize,
    /// Restrict the pass to these games (ESBIDS, comma-separated). Empty = all unsettled.
    pub esbids: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode = match std::env::var("SETTLE_MODE")
            .unwrap_or_else(|_| "direct".to_string())
            .to_lowercase()
            .as_str()
        {
            "direct" => SettleMode::Direct,
            "workers" => SettleMode::Workers,
            other => {
                return Err(AppError::Config(format!(
                    "SETTLE_MODE must be 'direct' or 'workers', got '{other}'"
                )))
            }
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "settlement.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            mode,
            worker_count: positive_count(
                "WORKER_COUNT",
                std::env::var("WORKER_COUNT").ok(),
                DEFAULT_WORKER_COUNT,
            )?,
            batch_size: positive_count("BATCH_SIZE", std::env::var("BATCH_SIZE").ok(), DEFAULT_BATCH_SIZE)?,
            esbids: std::env::var("ESBIDS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

/// Parse a count that must be at least 1; unset falls back to `default`.
fn positive_count(name: &str, raw: Option<String>, default: usize) -> Result<usize> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::Config(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_codes_are_closed_set() {
        assert_eq!(NFL_TEAM_CODES.len(), 32);
        assert!(is_valid_team_code("KC"));
        assert!(is_valid_team_code("SF"));
        assert!(!is_valid_team_code("kc"));
        assert!(!is_valid_team_code("XYZ"));
    }

    #[test]
    fn counts_reject_malformed_values() {
        assert_eq!(positive_count("BATCH_SIZE", None, 500).unwrap(), 500);
        assert_eq!(positive_count("BATCH_SIZE", Some(" 250 ".to_string()), 500).unwrap(), 250);
        for raw in ["0", "-3", "lots", ""] {
            let err = positive_count("BATCH_SIZE", Some(raw.to_string()), 500).unwrap_err();
            assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("BATCH_SIZE")), "{raw}");
        }
        assert!(positive_count("WORKER_COUNT", Some("0".to_string()), 4).is_err());
    }
}
