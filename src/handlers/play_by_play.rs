use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::calculator::numeric_outcome;
use crate::error::{AppError, Result};
use crate::handlers::MarketHandler;
use crate::registry::{AggregationType, MarketMapping, SpecialLogic};
use crate::source::{require_columns, PlayRecord, SettlementDataSource, StatRecord};
use crate::types::{HandlerKind, Market, Outcome};

/// Settles markets from individual plays: quarter/half splits, longest plays,
/// play counts and the first touchdown scorer.
pub struct PlayByPlayHandler {
    source: Arc<dyn SettlementDataSource>,
    cache: DashMap<String, Arc<Vec<PlayRecord>>>,
}

impl PlayByPlayHandler {
    pub fn new(source: Arc<dyn SettlementDataSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
        }
    }

    async fn plays(&self, esbid: &str) -> Result<Arc<Vec<PlayRecord>>> {
        if let Some(plays) = self.cache.get(esbid) {
            return Ok(Arc::clone(&plays));
        }
        let plays = self.source.plays(esbid).await?;
        if plays.is_empty() {
            return Err(AppError::NoPlays(esbid.to_string()));
        }
        debug!(esbid = %esbid, plays = plays.len(), "[PLAYS] loaded");
        let plays = Arc::new(plays);
        self.cache.insert(esbid.to_string(), Arc::clone(&plays));
        Ok(plays)
    }
}

/// Whether `pid` is credited with a scoring play: the ball carrier on a
/// rush, the target on a pass, either one otherwise.
fn scored_by(play: &PlayRecord, pid: &str) -> bool {
    let is = |role: &Option<String>| role.as_deref() == Some(pid);
    if play.is_play_type("RUSH") {
        is(&play.bc_pid)
    } else if play.is_play_type("PASS") {
        is(&play.trg_pid)
    } else {
        is(&play.bc_pid) || is(&play.trg_pid)
    }
}

/// 1 when `pid` scored the game's first touchdown, else 0.
fn first_touchdown_metric(plays: &[PlayRecord], column: &str, pid: &str) -> f64 {
    let first = plays
        .iter()
        .filter(|p| p.flag(column))
        .min_by_key(|p| p.play_id);
    match first {
        Some(play) if scored_by(play, pid) => 1.0,
        _ => 0.0,
    }
}

/// Aggregate a participant's plays inside the mapping's window.
fn window_metric(plays: &[PlayRecord], mapping: &MarketMapping, esbid: &str, pid: &str) -> Result<f64> {
    let role = mapping.player_role.ok_or(AppError::MissingField("player_role"))?;
    let column = mapping
        .primary_column()
        .ok_or(AppError::MissingField("metric_columns"))?;

    let involved: Vec<&PlayRecord> = plays
        .iter()
        .filter(|p| p.participant(role) == Some(pid))
        .collect();
    if involved.is_empty() {
        return Err(AppError::NoPlaysForPlayer {
            esbid: esbid.to_string(),
            pid: pid.to_string(),
        });
    }

    let quarters = mapping.quarters();
    let in_window = involved.into_iter().filter(|p| match &quarters {
        Some(quarters) => p.qtr.is_some_and(|q| quarters.contains(&q)),
        None => true,
    });

    if mapping.special_logic.is_some_and(SpecialLogic::is_count) {
        return Ok(in_window.filter(|p| p.flag(column)).count() as f64);
    }

    let values = in_window.filter_map(|p| p.stat(column));
    Ok(match mapping.aggregation_type {
        AggregationType::Sum => values.sum(),
        AggregationType::Max => values.reduce(f64::max).unwrap_or(0.0),
    })
}

#[async_trait]
impl MarketHandler for PlayByPlayHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::PlayByPlay
    }

    async fn calculate(&self, market: &Market, mapping: &MarketMapping) -> Result<Outcome> {
        let pid = market
            .selection_pid
            .as_deref()
            .ok_or_else(|| AppError::MissingSelectionPid(market.market_type.clone()))?;
        let selection = mapping.parse_selection(market)?;
        let plays = self.plays(&market.esbid).await?;
        if let Some(first) = plays.first() {
            require_columns(first, &mapping.metric_columns)?;
        }

        let metric_value = if mapping.special_logic == Some(SpecialLogic::FirstTouchdownScorer) {
            let column = mapping.primary_column().unwrap_or("td");
            first_touchdown_metric(&plays, column, pid)
        } else {
            window_metric(&plays, mapping, &market.esbid, pid)?
        };

        numeric_outcome(
            &market.market_type,
            Some(metric_value),
            &selection,
            market.selection_metric_line,
            mapping,
        )
    }

    async fn load_game(&self, esbid: &str, _markets: &[&Market]) -> Result<()> {
        self.plays(esbid).await.map(|_| ())
    }

    async fn prefetch(&self, esbids: &[String]) -> Result<()> {
        let mut loaded = 0;
        for esbid in esbids {
            match self.plays(esbid).await {
                Ok(_) => loaded += 1,
                // A game without plays is reported per market later.
                Err(AppError::NoPlays(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!(games = esbids.len(), loaded, "[PLAYS] prefetched play-by-play");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.source.ping().await.is_ok()
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
