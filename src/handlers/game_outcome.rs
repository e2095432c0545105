use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::calculator::{calculate_metric_value, numeric_outcome};
use crate::error::{AppError, Result};
use crate::handlers::MarketHandler;
use crate::registry::{CalculationType, MarketMapping};
use crate::source::{GameRecord, SettlementDataSource};
use crate::types::{HandlerKind, Market, MetricValue, Outcome, SelectionResult, SelectionType};

/// Metric code reported for a drawn moneyline.
pub const TIE: &str = "TIE";

/// Settles moneyline, spread and total markets from final scores.
pub struct GameOutcomeHandler {
    source: Arc<dyn SettlementDataSource>,
    cache: DashMap<String, Arc<GameRecord>>,
}

impl GameOutcomeHandler {
    pub fn new(source: Arc<dyn SettlementDataSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    async fn game(&self, esbid: &str) -> Result<Arc<GameRecord>> {
        if let Some(game) = self.cache.get(esbid) {
            return Ok(Arc::clone(&game));
        }
        let game = self
            .source
            .finalized_game(esbid)
            .await?
            .filter(|g| g.is_final)
            .ok_or_else(|| AppError::NoFinalizedGame(esbid.to_string()))?;
        let game = Arc::new(game);
        self.cache.insert(esbid.to_string(), Arc::clone(&game));
        Ok(game)
    }
}

fn selected_team<'a>(selection: &'a SelectionType, game: &GameRecord) -> Result<&'a str> {
    let team = selection
        .team()
        .ok_or_else(|| AppError::UnknownSelectionType(selection.to_string()))?;
    if !game.involves(team) {
        return Err(AppError::TeamNotInGame {
            team: team.to_string(),
            esbid: game.esbid.clone(),
            home: game.h.clone(),
            away: game.v.clone(),
        });
    }
    Ok(team)
}

fn moneyline(game: &GameRecord, team: &str) -> Outcome {
    let (Some(home), Some(away)) = (game.home_score, game.away_score) else {
        return Outcome {
            metric_value: None,
            selection_result: None,
        };
    };
    let winner = if home > away {
        game.h.as_str()
    } else if away > home {
        game.v.as_str()
    } else {
        TIE
    };
    // A tie loses for both sides.
    let selection_result = if winner == team {
        SelectionResult::Won
    } else {
        SelectionResult::Lost
    };
    Outcome {
        metric_value: Some(MetricValue::Code(winner.to_string())),
        selection_result: Some(selection_result),
    }
}

#[async_trait]
impl MarketHandler for GameOutcomeHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::GameOutcome
    }

    async fn calculate(&self, market: &Market, mapping: &MarketMapping) -> Result<Outcome> {
        let calculation_type = mapping
            .calculation_type
            .ok_or_else(|| AppError::UnknownCalculationType(market.market_type.clone()))?;
        let selection = mapping.parse_selection(market)?;
        let game = self.game(&market.esbid).await?;
        let line = market.selection_metric_line;

        match calculation_type {
            CalculationType::WinnerDetermination => {
                let team = selected_team(&selection, &game)?;
                Ok(moneyline(&game, team))
            }
            CalculationType::PointDifferentialVsSpread => {
                let team = selected_team(&selection, &game)?;
                // Differential is home-perspective; flip it for the visitor.
                let differential = calculate_metric_value(&*game, mapping)
                    .map(|diff| if team == game.v { -diff } else { diff });
                numeric_outcome(&market.market_type, differential, &selection, line, mapping)
            }
            CalculationType::TotalPoints => {
                let total = calculate_metric_value(&*game, mapping);
                numeric_outcome(&market.market_type, total, &selection, line, mapping)
            }
        }
    }

    async fn load_game(&self, esbid: &str, _markets: &[&Market]) -> Result<()> {
        self.game(esbid).await.map(|_| ())
    }

    async fn prefetch(&self, esbids: &[String]) -> Result<()> {
        let games = self.source.finalized_games(esbids).await?;
        let count = games.len();
        for game in games {
            self.cache.insert(game.esbid.clone(), Arc::new(game));
        }
        info!(requested = esbids.len(), finalized = count, "[GAMES] prefetched final scores");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.source.ping().await.is_ok()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
