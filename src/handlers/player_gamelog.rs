use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::calculator::{calculate_metric_value, numeric_outcome};
use crate::error::{AppError, Result};
use crate::handlers::{distinct_pids, MarketHandler};
use crate::registry::{MarketMapping, SpecialLogic};
use crate::source::{require_columns, PlayerGamelog, SettlementDataSource};
use crate::types::{HandlerKind, Market, Outcome};

/// Settles markets from a single player's box score.
pub struct PlayerGamelogHandler {
    source: Arc<dyn SettlementDataSource>,
    /// esbid → pid → row.
    cache: DashMap<String, HashMap<String, Arc<PlayerGamelog>>>,
    /// Games whose whole active roster is cached; a miss there is final.
    complete: DashSet<String>,
    /// (esbid, pid) pairs already requested and not found.
    absent: DashSet<(String, String)>,
}

impl PlayerGamelogHandler {
    pub fn new(source: Arc<dyn SettlementDataSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            complete: DashSet::new(),
            absent: DashSet::new(),
        }
    }

    fn cached(&self, esbid: &str, pid: &str) -> Option<Arc<PlayerGamelog>> {
        self.cache.get(esbid).and_then(|game| game.get(pid).cloned())
    }

    fn store(&self, esbid: &str, rows: Vec<PlayerGamelog>) {
        let mut game = self.cache.entry(esbid.to_string()).or_default();
        for row in rows {
            game.insert(row.pid.clone(), Arc::new(row));
        }
    }

    /// Fetch whichever of `pids` are not cached yet, in one read.
    async fn ensure_players(&self, esbid: &str, pids: &[String]) -> Result<()> {
        if self.complete.contains(esbid) {
            return Ok(());
        }
        let missing: Vec<String> = pids
            .iter()
            .filter(|pid| self.cached(esbid, pid).is_none())
            .filter(|pid| !self.absent.contains(&(esbid.to_string(), (*pid).clone())))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let rows = self.source.player_gamelogs(esbid, Some(&missing)).await?;
        debug!(esbid = %esbid, requested = missing.len(), found = rows.len(), "[PLAYER] box scores loaded");
        self.store(esbid, rows);
        for pid in missing {
            if self.cached(esbid, &pid).is_none() {
                self.absent.insert((esbid.to_string(), pid));
            }
        }
        Ok(())
    }

    async fn gamelog(&self, esbid: &str, pid: &str) -> Result<Arc<PlayerGamelog>> {
        self.ensure_players(esbid, &[pid.to_string()]).await?;
        self.cached(esbid, pid).ok_or_else(|| AppError::NoBoxScore {
            esbid: esbid.to_string(),
            pid: pid.to_string(),
        })
    }
}

#[async_trait]
impl MarketHandler for PlayerGamelogHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::PlayerGamelog
    }

    async fn calculate(&self, market: &Market, mapping: &MarketMapping) -> Result<Outcome> {
        let pid = market
            .selection_pid
            .as_deref()
            .ok_or_else(|| AppError::MissingSelectionPid(market.market_type.clone()))?;
        let selection = mapping.parse_selection(market)?;
        let row = self.gamelog(&market.esbid, pid).await?;
        require_columns(&*row, &mapping.metric_columns)?;

        let mut metric_value = calculate_metric_value(&*row, mapping);
        if mapping.special_logic == Some(SpecialLogic::AnytimeTouchdown) {
            metric_value = metric_value.map(|tds| if tds > 0.0 { 1.0 } else { 0.0 });
        }

        numeric_outcome(
            &market.market_type,
            metric_value,
            &selection,
            market.selection_metric_line,
            mapping,
        )
    }

    async fn load_game(&self, esbid: &str, markets: &[&Market]) -> Result<()> {
        self.ensure_players(esbid, &distinct_pids(markets)).await
    }

    async fn prefetch(&self, esbids: &[String]) -> Result<()> {
        let rows = self.source.player_gamelogs_for_games(esbids).await?;
        let count = rows.len();
        let mut by_game: HashMap<String, Vec<PlayerGamelog>> = HashMap::new();
        for row in rows {
            by_game.entry(row.esbid.clone()).or_default().push(row);
        }
        for esbid in esbids {
            self.store(esbid, by_game.remove(esbid).unwrap_or_default());
            self.complete.insert(esbid.clone());
        }
        info!(games = esbids.len(), rows = count, "[PLAYER] prefetched box scores");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.source.ping().await.is_ok()
    }

    fn clear_cache(&self) {
        self.cache.clear();
        self.complete.clear();
        self.absent.clear();
    }
}
