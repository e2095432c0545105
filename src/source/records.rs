use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{AppError, Result};
use crate::registry::PlayerRole;

/// Stat column → value. `None` is a present-but-null column.
pub type StatLine = BTreeMap<String, Option<f64>>;

/// Read access shared by every per-game record the calculator consumes.
pub trait StatRecord {
    /// Record family name used in schema-drift errors.
    fn record_kind(&self) -> &'static str;

    fn stat(&self, column: &str) -> Option<f64>;

    fn has_column(&self, column: &str) -> bool;

    fn columns(&self) -> Vec<String>;
}

/// Fails on the first declared column the record does not carry.
pub fn require_columns(record: &dyn StatRecord, columns: &[String]) -> Result<()> {
    for column in columns {
        if !record.has_column(column) {
            return Err(AppError::MissingColumn {
                column: column.clone(),
                record: record.record_kind(),
                available: record.columns(),
            });
        }
    }
    Ok(())
}

/// Scores arrive as integers, reals or text depending on the loader; anything
/// that is not a finite number is treated as missing.
pub fn parse_score(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Player box score
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGamelog {
    pub esbid: String,
    pub pid: String,
    pub tm: String,
    pub opp: Option<String>,
    pub active: bool,
    pub stats: StatLine,
}

impl StatRecord for PlayerGamelog {
    fn record_kind(&self) -> &'static str {
        "player box score"
    }

    fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied().flatten()
    }

    fn has_column(&self, column: &str) -> bool {
        self.stats.contains_key(column)
    }

    fn columns(&self) -> Vec<String> {
        self.stats.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Team aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamGamelog {
    pub esbid: String,
    pub tm: String,
    pub stats: StatLine,
}

impl TeamGamelog {
    /// Sum player rows into one row per (game, team). Null cells count as 0
    /// but a column is kept whenever any player row carries it.
    pub fn aggregate(rows: &[PlayerGamelog]) -> Vec<TeamGamelog> {
        let mut by_team: BTreeMap<(String, String), StatLine> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.active) {
            let totals = by_team.entry((row.esbid.clone(), row.tm.clone())).or_default();
            for (column, value) in &row.stats {
                let slot = totals.entry(column.clone()).or_insert(None);
                if let Some(v) = value {
                    *slot = Some(slot.unwrap_or(0.0) + v);
                }
            }
        }
        by_team
            .into_iter()
            .map(|((esbid, tm), stats)| TeamGamelog { esbid, tm, stats })
            .collect()
    }
}

impl StatRecord for TeamGamelog {
    fn record_kind(&self) -> &'static str {
        "team aggregate"
    }

    fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied().flatten()
    }

    fn has_column(&self, column: &str) -> bool {
        self.stats.contains_key(column)
    }

    fn columns(&self) -> Vec<String> {
        self.stats.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Play
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub esbid: String,
    /// Sequence number within the game; ordering key for "first" markets.
    pub play_id: i64,
    pub qtr: Option<u8>,
    pub play_type: Option<String>,
    pub psr_pid: Option<String>,
    pub bc_pid: Option<String>,
    pub trg_pid: Option<String>,
    pub stats: StatLine,
}

impl PlayRecord {
    pub fn participant(&self, role: PlayerRole) -> Option<&str> {
        match role {
            PlayerRole::Passer => self.psr_pid.as_deref(),
            PlayerRole::Rusher => self.bc_pid.as_deref(),
            PlayerRole::Receiver => self.trg_pid.as_deref(),
        }
    }

    /// Boolean stat columns are stored as 0/1.
    pub fn flag(&self, column: &str) -> bool {
        self.stat(column).is_some_and(|v| v != 0.0)
    }

    pub fn is_play_type(&self, play_type: &str) -> bool {
        self.play_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(play_type))
    }
}

impl StatRecord for PlayRecord {
    fn record_kind(&self) -> &'static str {
        "play"
    }

    fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied().flatten()
    }

    fn has_column(&self, column: &str) -> bool {
        self.stats.contains_key(column)
            || matches!(column, "psr_pid" | "bc_pid" | "trg_pid" | "qtr" | "play_type")
    }

    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = ["play_id", "qtr", "play_type", "psr_pid", "bc_pid", "trg_pid"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        columns.extend(self.stats.keys().cloned());
        columns
    }
}

// ---------------------------------------------------------------------------
// Finalized game
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub esbid: String,
    /// Home team code.
    pub h: String,
    /// Visitor team code.
    pub v: String,
    pub home_score: Option<f64>,
    pub away_score: Option<f64>,
    pub is_final: bool,
}

impl GameRecord {
    pub fn involves(&self, team: &str) -> bool {
        self.h == team || self.v == team
    }
}

impl StatRecord for GameRecord {
    fn record_kind(&self) -> &'static str {
        "finalized game"
    }

    fn stat(&self, column: &str) -> Option<f64> {
        match column {
            "home_score" => self.home_score,
            "away_score" => self.away_score,
            _ => None,
        }
    }

    fn has_column(&self, column: &str) -> bool {
        matches!(column, "home_score" | "away_score")
    }

    fn columns(&self) -> Vec<String> {
        vec!["home_score".to_string(), "away_score".to_string()]
    }
}

/// Group any per-game records by esbid.
pub fn group_by_game<T, F>(records: Vec<T>, esbid: F) -> HashMap<String, Vec<T>>
where
    F: Fn(&T) -> &str,
{
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for record in records {
        grouped.entry(esbid(&record).to_string()).or_default().push(record);
    }
    grouped
}
