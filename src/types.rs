use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;
use crate::registry::MarketMapping;

// ---------------------------------------------------------------------------
// Handler classification
// ---------------------------------------------------------------------------

/// The category of underlying data a market's resolution requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerKind {
    PlayerGamelog,
    PlayByPlay,
    GameOutcome,
    TeamStats,
    Unsupported,
}

impl HandlerKind {
    pub const SUPPORTED: [HandlerKind; 4] = [
        HandlerKind::PlayerGamelog,
        HandlerKind::PlayByPlay,
        HandlerKind::GameOutcome,
        HandlerKind::TeamStats,
    ];
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HandlerKind::PlayerGamelog => "player_gamelog",
            HandlerKind::PlayByPlay => "play_by_play",
            HandlerKind::GameOutcome => "game_outcome",
            HandlerKind::TeamStats => "team_stats",
            HandlerKind::Unsupported => "unsupported",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Selections
// ---------------------------------------------------------------------------

/// The side of a market a selection takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionType {
    Over,
    Under,
    Yes,
    No,
    /// A team code, e.g. `KC`.
    Team(String),
}

/// Families of selection types a market accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    OverUnder,
    YesNo,
    Team,
}

impl SelectionType {
    pub fn kind(&self) -> SelectionKind {
        match self {
            SelectionType::Over | SelectionType::Under => SelectionKind::OverUnder,
            SelectionType::Yes | SelectionType::No => SelectionKind::YesNo,
            SelectionType::Team(_) => SelectionKind::Team,
        }
    }

    pub fn team(&self) -> Option<&str> {
        match self {
            SelectionType::Team(code) => Some(code),
            _ => None,
        }
    }
}

impl FromStr for SelectionType {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "OVER" => Ok(SelectionType::Over),
            "UNDER" => Ok(SelectionType::Under),
            "YES" => Ok(SelectionType::Yes),
            "NO" => Ok(SelectionType::No),
            code if (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) => {
                Ok(SelectionType::Team(code.to_string()))
            }
            _ => Err(AppError::UnknownSelectionType(raw.to_string())),
        }
    }
}

impl std::fmt::Display for SelectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionType::Over => write!(f, "OVER"),
            SelectionType::Under => write!(f, "UNDER"),
            SelectionType::Yes => write!(f, "YES"),
            SelectionType::No => write!(f, "NO"),
            SelectionType::Team(code) => write!(f, "{code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionResult {
    Won,
    Lost,
    Push,
}

impl std::fmt::Display for SelectionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SelectionResult::Won => "WON",
            SelectionResult::Lost => "LOST",
            SelectionResult::Push => "PUSH",
        };
        write!(f, "{s}")
    }
}

/// Which recorded betting-line snapshot a result is persisted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeType {
    Open,
    Close,
}

impl std::fmt::Display for TimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeType::Open => write!(f, "OPEN"),
            TimeType::Close => write!(f, "CLOSE"),
        }
    }
}

/// Computed real-world statistic. Moneyline markets carry the winning team code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Code(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Code(_) => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Code(c) => write!(f, "{c}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market (input)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub esbid: String,
    pub market_type: String,
    #[serde(default)]
    pub selection_pid: Option<String>,
    pub selection_type: String,
    #[serde(default)]
    pub selection_metric_line: Option<f64>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_market_id: Option<String>,
    #[serde(default)]
    pub source_selection_id: Option<String>,
    #[serde(default)]
    pub time_type: Option<TimeType>,
    /// Bypasses the registry when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_override: Option<MarketMapping>,
}

impl Market {
    pub fn new(esbid: &str, market_type: &str, selection_type: &str) -> Self {
        Self {
            esbid: esbid.to_string(),
            market_type: market_type.to_string(),
            selection_pid: None,
            selection_type: selection_type.to_string(),
            selection_metric_line: None,
            source_id: None,
            source_market_id: None,
            source_selection_id: None,
            time_type: None,
            mapping_override: None,
        }
    }

    pub fn with_pid(mut self, pid: &str) -> Self {
        self.selection_pid = Some(pid.to_string());
        self
    }

    pub fn with_line(mut self, line: f64) -> Self {
        self.selection_metric_line = Some(line);
        self
    }

    pub fn with_mapping(mut self, mapping: MarketMapping) -> Self {
        self.mapping_override = Some(mapping);
        self
    }

    /// Short identifier for log lines.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.esbid,
            self.market_type,
            self.selection_pid.as_deref().unwrap_or("-")
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement result (output)
// ---------------------------------------------------------------------------

/// Metric and result pair produced by a handler for one market.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub metric_value: Option<MetricValue>,
    pub selection_result: Option<SelectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub esbid: String,
    pub market_type: String,
    pub selection_pid: Option<String>,
    pub selection_type: String,
    pub selection_metric_line: Option<f64>,
    pub source_id: Option<String>,
    pub source_market_id: Option<String>,
    pub source_selection_id: Option<String>,
    pub metric_value: Option<MetricValue>,
    pub selection_result: Option<SelectionResult>,
    pub handler_type: HandlerKind,
    pub error: Option<String>,
    pub time_type: Option<TimeType>,
}

impl SettlementResult {
    fn echo(market: &Market, handler_type: HandlerKind) -> Self {
        Self {
            esbid: market.esbid.clone(),
            market_type: market.market_type.clone(),
            selection_pid: market.selection_pid.clone(),
            selection_type: market.selection_type.clone(),
            selection_metric_line: market.selection_metric_line,
            source_id: market.source_id.clone(),
            source_market_id: market.source_market_id.clone(),
            source_selection_id: market.source_selection_id.clone(),
            metric_value: None,
            selection_result: None,
            handler_type,
            error: None,
            time_type: market.time_type,
        }
    }

    pub fn settled(market: &Market, handler_type: HandlerKind, outcome: Outcome) -> Self {
        Self {
            metric_value: outcome.metric_value,
            selection_result: outcome.selection_result,
            ..Self::echo(market, handler_type)
        }
    }

    pub fn failed(market: &Market, handler_type: HandlerKind, error: &AppError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::echo(market, handler_type)
        }
    }

    pub fn with_time_type(mut self, time_type: TimeType) -> Self {
        self.time_type = Some(time_type);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
