//! Market type registry.
//!
//! Maps every market type to the handler that settles it and the parameters
//! that handler needs. The table is built once by [`MarketRegistry::build`]
//! and is read-only afterwards; alt-line types are derived from their base
//! types rather than declared.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::{FIRST_HALF_QUARTERS, SECOND_HALF_QUARTERS};
use crate::error::{AppError, Result};
use crate::types::{HandlerKind, Market, SelectionKind, SelectionType};

// ---------------------------------------------------------------------------
// Mapping parameters
// ---------------------------------------------------------------------------

/// Settlement rules that replace plain line comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialLogic {
    /// YES wins when the player scored at least one touchdown.
    AnytimeTouchdown,
    /// YES wins when the player scored the game's first touchdown.
    FirstTouchdownScorer,
    /// YES wins when the player scored two or more touchdowns.
    TwoPlusTouchdowns,
    /// Count completed-catch plays instead of summing yardage.
    CountReceptions,
    /// Count attempt-flagged plays instead of summing yardage.
    CountAttempts,
}

impl SpecialLogic {
    /// Yes/no props resolve against a fixed threshold instead of a line.
    pub fn is_yes_no(self) -> bool {
        matches!(
            self,
            SpecialLogic::AnytimeTouchdown
                | SpecialLogic::FirstTouchdownScorer
                | SpecialLogic::TwoPlusTouchdowns
        )
    }

    pub fn is_count(self) -> bool {
        matches!(self, SpecialLogic::CountReceptions | SpecialLogic::CountAttempts)
    }
}

/// Derived game-outcome metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    WinnerDetermination,
    PointDifferentialVsSpread,
    TotalPoints,
}

/// Play participant a play-by-play market follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    Passer,
    Rusher,
    Receiver,
}

impl PlayerRole {
    pub fn column(self) -> &'static str {
        match self {
            PlayerRole::Passer => "psr_pid",
            PlayerRole::Rusher => "bc_pid",
            PlayerRole::Receiver => "trg_pid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    #[default]
    Sum,
    Max,
}

// ---------------------------------------------------------------------------
// MarketMapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMapping {
    pub handler: HandlerKind,
    /// Stat keys summed into the metric. The first is the primary column.
    #[serde(default)]
    pub metric_columns: Vec<String>,
    #[serde(default)]
    pub has_metric_value: bool,
    #[serde(default)]
    pub selection_types: Vec<SelectionKind>,
    #[serde(default)]
    pub special_logic: Option<SpecialLogic>,
    #[serde(default)]
    pub calculation_type: Option<CalculationType>,
    #[serde(default)]
    pub player_role: Option<PlayerRole>,
    #[serde(default)]
    pub quarter_filter: Option<u8>,
    /// 1 = quarters 1-2, 2 = quarters 3-4.
    #[serde(default)]
    pub half_filter: Option<u8>,
    #[serde(default)]
    pub team_filter: bool,
    #[serde(default)]
    pub team_aggregate: bool,
    #[serde(default)]
    pub aggregation_type: AggregationType,
    #[serde(default)]
    pub is_alt_line: bool,
}

impl MarketMapping {
    pub fn new(handler: HandlerKind) -> Self {
        Self {
            handler,
            metric_columns: Vec::new(),
            has_metric_value: false,
            selection_types: Vec::new(),
            special_logic: None,
            calculation_type: None,
            player_role: None,
            quarter_filter: None,
            half_filter: None,
            team_filter: false,
            team_aggregate: false,
            aggregation_type: AggregationType::Sum,
            is_alt_line: false,
        }
    }

    pub fn unsupported() -> Self {
        Self::new(HandlerKind::Unsupported)
    }

    /// Numeric stat market over the given columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.metric_columns = columns.iter().map(|c| c.to_string()).collect();
        self.has_metric_value = true;
        self
    }

    pub fn selections(mut self, kinds: &[SelectionKind]) -> Self {
        self.selection_types = kinds.to_vec();
        self
    }

    pub fn over_under(self) -> Self {
        self.selections(&[SelectionKind::OverUnder])
    }

    pub fn special(mut self, logic: SpecialLogic) -> Self {
        self.special_logic = Some(logic);
        if logic.is_yes_no() {
            self.selection_types = vec![SelectionKind::YesNo];
        }
        self
    }

    pub fn calculation(mut self, calculation_type: CalculationType) -> Self {
        self.calculation_type = Some(calculation_type);
        self.has_metric_value = calculation_type != CalculationType::WinnerDetermination;
        self
    }

    pub fn role(mut self, role: PlayerRole) -> Self {
        self.player_role = Some(role);
        self
    }

    pub fn quarter(mut self, quarter: u8) -> Self {
        self.quarter_filter = Some(quarter);
        self
    }

    pub fn half(mut self, half: u8) -> Self {
        self.half_filter = Some(half);
        self
    }

    pub fn max(mut self) -> Self {
        self.aggregation_type = AggregationType::Max;
        self
    }

    pub fn team(mut self) -> Self {
        self.team_filter = true;
        self.team_aggregate = true;
        self.selection_types = vec![SelectionKind::Team];
        self
    }

    pub fn primary_column(&self) -> Option<&str> {
        self.metric_columns.first().map(String::as_str)
    }

    pub fn is_spread(&self) -> bool {
        self.calculation_type == Some(CalculationType::PointDifferentialVsSpread)
    }

    /// Quarters a play must fall in, or `None` for the whole game.
    pub fn quarters(&self) -> Option<Vec<u8>> {
        if let Some(q) = self.quarter_filter {
            return Some(vec![q]);
        }
        match self.half_filter {
            Some(1) => Some(FIRST_HALF_QUARTERS.to_vec()),
            Some(2) => Some(SECOND_HALF_QUARTERS.to_vec()),
            Some(_) => Some(Vec::new()),
            None => None,
        }
    }

    /// Parse a market's raw selection against the selection kinds this mapping allows.
    pub fn parse_selection(&self, market: &Market) -> Result<SelectionType> {
        // Team-only markets read the raw value as a code so `NO` stays New Orleans.
        let selection = if self.selection_types == [SelectionKind::Team] {
            let code = market.selection_type.trim().to_ascii_uppercase();
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AppError::UnknownSelectionType(market.selection_type.clone()));
            }
            SelectionType::Team(code)
        } else {
            market.selection_type.parse::<SelectionType>()?
        };

        if !self.selection_types.is_empty() && !self.selection_types.contains(&selection.kind()) {
            return Err(AppError::SelectionNotAllowed {
                selection: selection.to_string(),
                market_type: market.market_type.clone(),
            });
        }
        Ok(selection)
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Market types that are recognised but have no settlement path.
const UNSUPPORTED_MARKET_TYPES: &[&str] = &[
    "GAME_KICKING_POINTS",
    "GAME_FIELD_GOALS_MADE",
    "GAME_TACKLES_ASSISTS",
    "GAME_MVP",
];

/// Alt-line types; each resolves to the base type with `ALT_` removed.
const ALT_LINE_MARKET_TYPES: &[&str] = &[
    "GAME_ALT_PASSING_YARDS",
    "GAME_ALT_PASSING_COMPLETIONS",
    "GAME_ALT_PASSING_TOUCHDOWNS",
    "GAME_ALT_RUSHING_YARDS",
    "GAME_ALT_RECEIVING_YARDS",
    "GAME_ALT_RECEPTIONS",
    "GAME_ALT_RUSHING_RECEIVING_YARDS",
    "GAME_ALT_SPREAD",
    "GAME_ALT_TOTAL",
    "GAME_ALT_KICKING_POINTS",
];

fn base_market_mappings() -> Vec<(&'static str, MarketMapping)> {
    use HandlerKind::*;
    use PlayerRole::*;

    let player = |cols: &[&str]| MarketMapping::new(PlayerGamelog).columns(cols).over_under();
    let plays = |role: PlayerRole, col: &str| {
        MarketMapping::new(PlayByPlay).columns(&[col]).over_under().role(role)
    };
    let team = |cols: &[&str]| MarketMapping::new(TeamStats).columns(cols).team();

    vec![
        // box score
        ("GAME_PASSING_YARDS", player(&["py"])),
        ("GAME_PASSING_COMPLETIONS", player(&["pc"])),
        ("GAME_PASSING_ATTEMPTS", player(&["pa"])),
        ("GAME_PASSING_TOUCHDOWNS", player(&["tdp"])),
        ("GAME_PASSING_INTERCEPTIONS", player(&["ints"])),
        ("GAME_RUSHING_YARDS", player(&["ry"])),
        ("GAME_RUSHING_ATTEMPTS", player(&["ra"])),
        ("GAME_RECEIVING_YARDS", player(&["recy"])),
        ("GAME_RECEPTIONS", player(&["rec"])),
        ("GAME_RUSHING_RECEIVING_YARDS", player(&["ry", "recy"])),
        ("GAME_PASSING_RUSHING_YARDS", player(&["py", "ry"])),
        ("GAME_LONGEST_RECEPTION", player(&["longest_reception"])),
        ("GAME_LONGEST_RUSH", player(&["longest_rush"])),
        (
            "ANYTIME_TOUCHDOWN",
            MarketMapping::new(PlayerGamelog)
                .columns(&["tdr", "tdrec"])
                .special(SpecialLogic::AnytimeTouchdown),
        ),
        (
            "GAME_TWO_PLUS_TOUCHDOWNS",
            MarketMapping::new(PlayerGamelog)
                .columns(&["tdr", "tdrec"])
                .special(SpecialLogic::TwoPlusTouchdowns),
        ),
        // play by play
        (
            "FIRST_TOUCHDOWN_SCORER",
            MarketMapping::new(PlayByPlay)
                .columns(&["td"])
                .special(SpecialLogic::FirstTouchdownScorer),
        ),
        ("GAME_LONGEST_COMPLETION", plays(Passer, "pass_yds").max()),
        ("GAME_FIRST_QUARTER_PASSING_YARDS", plays(Passer, "pass_yds").quarter(1)),
        ("GAME_FIRST_QUARTER_RUSHING_YARDS", plays(Rusher, "rush_yds").quarter(1)),
        ("GAME_FIRST_QUARTER_RECEIVING_YARDS", plays(Receiver, "recv_yds").quarter(1)),
        ("GAME_FIRST_HALF_PASSING_YARDS", plays(Passer, "pass_yds").half(1)),
        ("GAME_FIRST_HALF_RUSHING_YARDS", plays(Rusher, "rush_yds").half(1)),
        ("GAME_FIRST_HALF_RECEIVING_YARDS", plays(Receiver, "recv_yds").half(1)),
        ("GAME_SECOND_HALF_PASSING_YARDS", plays(Passer, "pass_yds").half(2)),
        ("GAME_SECOND_HALF_RUSHING_YARDS", plays(Rusher, "rush_yds").half(2)),
        (
            "GAME_FIRST_QUARTER_RECEPTIONS",
            plays(Receiver, "comp").quarter(1).special(SpecialLogic::CountReceptions),
        ),
        (
            "GAME_FIRST_HALF_RECEPTIONS",
            plays(Receiver, "comp").half(1).special(SpecialLogic::CountReceptions),
        ),
        (
            "GAME_FIRST_QUARTER_PASSING_ATTEMPTS",
            plays(Passer, "pass_att").quarter(1).special(SpecialLogic::CountAttempts),
        ),
        (
            "GAME_FIRST_HALF_RUSHING_ATTEMPTS",
            plays(Rusher, "rush_att").half(1).special(SpecialLogic::CountAttempts),
        ),
        // game outcome
        (
            "GAME_MONEYLINE",
            MarketMapping::new(GameOutcome)
                .selections(&[SelectionKind::Team])
                .calculation(CalculationType::WinnerDetermination),
        ),
        (
            "GAME_SPREAD",
            MarketMapping::new(GameOutcome)
                .selections(&[SelectionKind::Team])
                .calculation(CalculationType::PointDifferentialVsSpread),
        ),
        (
            "GAME_TOTAL",
            MarketMapping::new(GameOutcome)
                .over_under()
                .calculation(CalculationType::TotalPoints),
        ),
        // team aggregate
        ("TEAM_PASSING_YARDS", team(&["py"])),
        ("TEAM_RUSHING_YARDS", team(&["ry"])),
        ("TEAM_RECEIVING_YARDS", team(&["recy"])),
        ("TEAM_PASSING_TOUCHDOWNS", team(&["tdp"])),
        ("TEAM_RUSHING_TOUCHDOWNS", team(&["tdr"])),
        ("TEAM_RECEIVING_TOUCHDOWNS", team(&["tdrec"])),
        ("TEAM_SACKS", team(&["dsk"])),
        ("TEAM_INTERCEPTIONS", team(&["dint"])),
    ]
}

/// `GAME_ALT_PASSING_YARDS` -> `GAME_PASSING_YARDS`.
pub fn alt_line_base_type(alt_type: &str) -> Option<String> {
    if let Some(rest) = alt_type.strip_prefix("ALT_") {
        return Some(rest.to_string());
    }
    alt_type
        .find("_ALT_")
        .map(|idx| format!("{}_{}", &alt_type[..idx], &alt_type[idx + "_ALT_".len()..]))
}

// ---------------------------------------------------------------------------
// MarketRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MarketRegistry {
    mappings: HashMap<String, MarketMapping>,
    unsupported: MarketMapping,
}

static REGISTRY: LazyLock<MarketRegistry> = LazyLock::new(MarketRegistry::build);

/// Process-wide read-only registry.
pub fn registry() -> &'static MarketRegistry {
    &REGISTRY
}

impl MarketRegistry {
    pub fn build() -> Self {
        let mut mappings: HashMap<String, MarketMapping> = base_market_mappings()
            .into_iter()
            .map(|(market_type, mapping)| (market_type.to_string(), mapping))
            .collect();

        for market_type in UNSUPPORTED_MARKET_TYPES {
            mappings.insert(market_type.to_string(), MarketMapping::unsupported());
        }

        let derived: Vec<(String, MarketMapping)> = ALT_LINE_MARKET_TYPES
            .iter()
            .filter_map(|alt_type| {
                let base = mappings.get(&alt_line_base_type(alt_type)?)?;
                if base.handler == HandlerKind::Unsupported {
                    return None;
                }
                let mut mapping = base.clone();
                mapping.is_alt_line = true;
                Some((alt_type.to_string(), mapping))
            })
            .collect();
        mappings.extend(derived);

        Self {
            mappings,
            unsupported: MarketMapping::unsupported(),
        }
    }

    /// Mapping for a market type; unknown types get the UNSUPPORTED mapping.
    pub fn mapping(&self, market_type: &str) -> &MarketMapping {
        self.mappings.get(market_type).unwrap_or(&self.unsupported)
    }

    pub fn classify(&self, market_type: &str) -> HandlerKind {
        self.mapping(market_type).handler
    }

    /// The attached override when present, otherwise the registry mapping.
    pub fn resolve<'a>(&'a self, market: &'a Market) -> &'a MarketMapping {
        market
            .mapping_override
            .as_ref()
            .unwrap_or_else(|| self.mapping(&market.market_type))
    }

    pub fn market_types(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_market_type_is_unsupported() {
        let reg = registry();
        assert_eq!(reg.classify("GAME_HOT_DOGS_EATEN"), HandlerKind::Unsupported);
        assert_eq!(reg.classify("GAME_KICKING_POINTS"), HandlerKind::Unsupported);
        assert!(reg.mapping("nope").metric_columns.is_empty());
    }

    #[test]
    fn classifies_each_handler_family() {
        let reg = registry();
        assert_eq!(reg.classify("GAME_PASSING_YARDS"), HandlerKind::PlayerGamelog);
        assert_eq!(reg.classify("FIRST_TOUCHDOWN_SCORER"), HandlerKind::PlayByPlay);
        assert_eq!(reg.classify("GAME_SPREAD"), HandlerKind::GameOutcome);
        assert_eq!(reg.classify("TEAM_SACKS"), HandlerKind::TeamStats);
    }

    #[test]
    fn alt_lines_copy_base_mapping() {
        let reg = registry();
        let base = reg.mapping("GAME_PASSING_YARDS");
        let alt = reg.mapping("GAME_ALT_PASSING_YARDS");
        assert!(alt.is_alt_line);
        assert!(!base.is_alt_line);
        assert_eq!(alt.metric_columns, base.metric_columns);
        assert_eq!(alt.handler, base.handler);

        let alt_spread = reg.mapping("GAME_ALT_SPREAD");
        assert!(alt_spread.is_alt_line);
        assert!(alt_spread.is_spread());
    }

    #[test]
    fn alt_line_of_unsupported_base_is_skipped() {
        let reg = registry();
        assert_eq!(reg.classify("GAME_ALT_KICKING_POINTS"), HandlerKind::Unsupported);
        assert!(!reg.mapping("GAME_ALT_KICKING_POINTS").is_alt_line);
    }

    #[test]
    fn alt_base_name_transformation() {
        assert_eq!(
            alt_line_base_type("GAME_ALT_RUSHING_RECEIVING_YARDS").as_deref(),
            Some("GAME_RUSHING_RECEIVING_YARDS")
        );
        assert_eq!(alt_line_base_type("ALT_SPREAD").as_deref(), Some("SPREAD"));
        assert_eq!(alt_line_base_type("GAME_PASSING_YARDS"), None);
    }

    #[test]
    fn build_is_deterministic() {
        let a = MarketRegistry::build();
        let b = MarketRegistry::build();
        assert_eq!(a.len(), b.len());
        for market_type in a.market_types() {
            assert_eq!(a.mapping(market_type), b.mapping(market_type));
        }
    }

    #[test]
    fn override_bypasses_registry() {
        let custom = MarketMapping::new(HandlerKind::TeamStats).columns(&["py"]).team();
        let market = Market::new("g1", "GAME_HOT_DOGS_EATEN", "KC").with_mapping(custom.clone());
        assert_eq!(registry().resolve(&market), &custom);

        let plain = Market::new("g1", "GAME_HOT_DOGS_EATEN", "OVER");
        assert_eq!(registry().resolve(&plain).handler, HandlerKind::Unsupported);
    }

    #[test]
    fn half_filter_expands_to_quarters() {
        let first = registry().mapping("GAME_FIRST_HALF_RUSHING_YARDS");
        assert_eq!(first.quarters(), Some(vec![1, 2]));
        let second = registry().mapping("GAME_SECOND_HALF_RUSHING_YARDS");
        assert_eq!(second.quarters(), Some(vec![3, 4]));
        let q1 = registry().mapping("GAME_FIRST_QUARTER_RUSHING_YARDS");
        assert_eq!(q1.quarters(), Some(vec![1]));
        assert_eq!(registry().mapping("GAME_LONGEST_COMPLETION").quarters(), None);
    }

    #[test]
    fn team_only_markets_parse_codes_literally() {
        let moneyline = registry().mapping("GAME_MONEYLINE");
        let market = Market::new("g1", "GAME_MONEYLINE", "NO");
        assert_eq!(
            moneyline.parse_selection(&market).unwrap(),
            SelectionType::Team("NO".to_string())
        );

        let total = registry().mapping("GAME_TOTAL");
        let market = Market::new("g1", "GAME_TOTAL", "KC");
        assert!(matches!(
            total.parse_selection(&market),
            Err(AppError::SelectionNotAllowed { .. })
        ));
    }
}
