use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::calculator::{calculate_metric_value, numeric_outcome};
use crate::config::is_valid_team_code;
use crate::error::{AppError, Result};
use crate::handlers::MarketHandler;
use crate::registry::MarketMapping;
use crate::source::{require_columns, SettlementDataSource, TeamGamelog};
use crate::types::{HandlerKind, Market, Outcome, SelectionType};

/// Settles team-level markets from per-team sums of the box scores.
pub struct TeamStatsHandler {
    source: Arc<dyn SettlementDataSource>,
    cache: DashMap<String, Arc<Vec<TeamGamelog>>>,
}

impl TeamStatsHandler {
    pub fn new(source: Arc<dyn SettlementDataSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    async fn teams(&self, esbid: &str) -> Result<Arc<Vec<TeamGamelog>>> {
        if let Some(teams) = self.cache.get(esbid) {
            return Ok(Arc::clone(&teams));
        }
        let teams = Arc::new(self.source.team_gamelogs(esbid).await?);
        debug!(esbid = %esbid, teams = teams.len(), "[TEAM] aggregates loaded");
        self.cache.insert(esbid.to_string(), Arc::clone(&teams));
        Ok(teams)
    }
}

fn validate_inputs(market: &Market, mapping: &MarketMapping) -> Result<()> {
    if market.esbid.trim().is_empty() {
        return Err(AppError::MissingField("esbid"));
    }
    if market.market_type.trim().is_empty() {
        return Err(AppError::MissingField("market_type"));
    }
    if mapping.metric_columns.is_empty() {
        return Err(AppError::MissingField("mapping"));
    }
    if market.selection_type.trim().is_empty() {
        return Err(AppError::MissingField("selection_type"));
    }
    Ok(())
}

fn team_row<'a>(teams: &'a [TeamGamelog], esbid: &str, team: &str) -> Result<&'a TeamGamelog> {
    teams
        .iter()
        .find(|t| t.tm == team)
        .ok_or_else(|| AppError::NoTeamStats {
            esbid: esbid.to_string(),
            team: team.to_string(),
        })
}

#[async_trait]
impl MarketHandler for TeamStatsHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::TeamStats
    }

    async fn calculate(&self, market: &Market, mapping: &MarketMapping) -> Result<Outcome> {
        validate_inputs(market, mapping)?;
        let selection = mapping.parse_selection(market)?;
        let team = selection
            .team()
            .ok_or_else(|| AppError::UnknownSelectionType(market.selection_type.clone()))?;
        if !is_valid_team_code(team) {
            return Err(AppError::InvalidTeamCode(team.to_string()));
        }

        let teams = self.teams(&market.esbid).await?;
        let selected = team_row(&teams, &market.esbid, team)?;
        require_columns(selected, &mapping.metric_columns)?;
        let total = calculate_metric_value(selected, mapping);

        if mapping.team_filter {
            return numeric_outcome(
                &market.market_type,
                total,
                &SelectionType::Over,
                market.selection_metric_line,
                mapping,
            );
        }

        // Comparative: selected team minus opponent, decided by sign.
        let opponent = teams
            .iter()
            .find(|t| t.tm != team)
            .ok_or_else(|| AppError::NoTeamStats {
                esbid: market.esbid.clone(),
                team: format!("opponent of {team}"),
            })?;
        let difference = total.zip(calculate_metric_value(opponent, mapping)).map(|(ours, theirs)| ours - theirs);
        numeric_outcome(
            &market.market_type,
            difference,
            &SelectionType::Over,
            Some(0.0),
            mapping,
        )
    }

    async fn load_game(&self, esbid: &str, _markets: &[&Market]) -> Result<()> {
        self.teams(esbid).await.map(|_| ())
    }

    async fn prefetch(&self, esbids: &[String]) -> Result<()> {
        for esbid in esbids {
            self.teams(esbid).await?;
        }
        info!(games = esbids.len(), "[TEAM] prefetched team aggregates");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.source.ping().await.is_ok()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;
    use crate::testing::{self, CountingSource, KC_DET};
    use crate::types::{MetricValue, SelectionResult};

    fn handler() -> TeamStatsHandler {
        TeamStatsHandler::new(testing::source())
    }

    async fn settle(h: &TeamStatsHandler, market: Market) -> Result<Outcome> {
        let mapping = registry().resolve(&market).clone();
        h.calculate(&market, &mapping).await
    }

    #[tokio::test]
    async fn selected_team_sum_resolves_as_over() {
        let h = handler();
        let kc = settle(&h, Market::new(KC_DET, "TEAM_PASSING_YARDS", "KC").with_line(270.5))
            .await
            .unwrap();
        assert_eq!(kc.metric_value, Some(MetricValue::Number(275.0)));
        assert_eq!(kc.selection_result, Some(SelectionResult::Won));

        let rushing = settle(&h, Market::new(KC_DET, "TEAM_RUSHING_YARDS", "KC").with_line(104.0))
            .await
            .unwrap();
        assert_eq!(rushing.metric_value, Some(MetricValue::Number(104.0)));
        assert_eq!(rushing.selection_result, Some(SelectionResult::Push));

        let sacks = settle(&h, Market::new(KC_DET, "TEAM_SACKS", "DET").with_line(2.5))
            .await
            .unwrap();
        assert_eq!(sacks.selection_result, Some(SelectionResult::Lost));
    }

    #[tokio::test]
    async fn invalid_and_absent_teams() {
        let h = handler();
        let err = settle(&h, Market::new(KC_DET, "TEAM_SACKS", "XYZ").with_line(1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTeamCode(_)));

        let err = settle(&h, Market::new(KC_DET, "TEAM_SACKS", "BUF").with_line(1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoTeamStats { .. }));
    }

    #[tokio::test]
    async fn required_inputs_fail_fast() {
        let h = handler();
        let err = settle(&h, Market::new(KC_DET, "TEAM_SACKS", " ").with_line(1.5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("selection_type"));

        let err = settle(&h, Market::new("", "TEAM_SACKS", "KC").with_line(1.5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("esbid"));

        let bare = MarketMapping::new(HandlerKind::TeamStats).team();
        let market = Market::new(KC_DET, "TEAM_CUSTOM", "KC").with_mapping(bare);
        let err = settle(&h, market).await.unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[tokio::test]
    async fn comparative_mapping_uses_opponent_difference() {
        let mut mapping = MarketMapping::new(HandlerKind::TeamStats).columns(&["py"]).team();
        mapping.team_filter = false;
        let h = handler();

        let kc = Market::new(KC_DET, "TEAM_PASSING_EDGE", "KC").with_mapping(mapping.clone());
        let outcome = settle(&h, kc).await.unwrap();
        assert_eq!(outcome.metric_value, Some(MetricValue::Number(-35.0)));
        assert_eq!(outcome.selection_result, Some(SelectionResult::Lost));

        let det = Market::new(KC_DET, "TEAM_PASSING_EDGE", "DET").with_mapping(mapping);
        let outcome = settle(&h, det).await.unwrap();
        assert_eq!(outcome.selection_result, Some(SelectionResult::Won));
    }

    #[tokio::test]
    async fn aggregates_are_cached_per_game() {
        let source = CountingSource::new();
        let h = TeamStatsHandler::new(source.clone());
        let markets = vec![
            Market::new(KC_DET, "TEAM_PASSING_YARDS", "KC").with_line(300.5),
            Market::new(KC_DET, "TEAM_RECEIVING_TOUCHDOWNS", "DET").with_line(0.5),
            Market::new(KC_DET, "TEAM_INTERCEPTIONS", "DET"),
        ];
        let results = h.batch_calculate(&markets).await;
        assert_eq!(results[0].selection_result, Some(SelectionResult::Lost));
        assert_eq!(results[1].selection_result, Some(SelectionResult::Won));
        assert!(results[2].error.as_deref().unwrap().contains("requires a metric line"));
        assert_eq!(CountingSource::reads(&source.team_reads), 1);
    }
}
