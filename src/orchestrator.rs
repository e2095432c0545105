//! Routes markets to handlers and folds every failure into a result.

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::handlers::{
    settle_isolated, GameOutcomeHandler, MarketHandler, PlayByPlayHandler, PlayerGamelogHandler,
    TeamStatsHandler,
};
use crate::registry::registry;
use crate::source::SettlementDataSource;
use crate::types::{HandlerKind, Market, SettlementResult};

#[derive(Debug, Clone, Serialize)]
pub struct HandlerHealth {
    pub handler: HandlerKind,
    pub healthy: bool,
    pub checked_in_ms: f64,
}

#[derive(Default)]
pub struct SettlementOrchestrator {
    handlers: HashMap<HandlerKind, Arc<dyn MarketHandler>>,
    /// market_type → classification; registry lookups are memoized here.
    classification_cache: DashMap<String, HandlerKind>,
}

impl SettlementOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orchestrator with all four handlers reading from `source`.
    pub fn with_source(source: Arc<dyn SettlementDataSource>) -> Self {
        let mut orchestrator = Self::new();
        orchestrator.register(Arc::new(PlayerGamelogHandler::new(Arc::clone(&source))));
        orchestrator.register(Arc::new(PlayByPlayHandler::new(Arc::clone(&source))));
        orchestrator.register(Arc::new(GameOutcomeHandler::new(Arc::clone(&source))));
        orchestrator.register(Arc::new(TeamStatsHandler::new(source)));
        orchestrator
    }

    /// Replaces any handler already registered for the same classification.
    pub fn register(&mut self, handler: Arc<dyn MarketHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn registered(&self) -> Vec<HandlerKind> {
        HandlerKind::SUPPORTED
            .into_iter()
            .filter(|kind| self.handlers.contains_key(kind))
            .collect()
    }

    fn classify(&self, market: &Market) -> HandlerKind {
        if let Some(mapping) = &market.mapping_override {
            return mapping.handler;
        }
        if let Some(kind) = self.classification_cache.get(&market.market_type) {
            return *kind;
        }
        let kind = registry().classify(&market.market_type);
        self.classification_cache.insert(market.market_type.clone(), kind);
        kind
    }

    /// The handler for `kind`, or the error result when there is none to run.
    fn dispatch(
        &self,
        market: &Market,
        kind: HandlerKind,
    ) -> std::result::Result<&Arc<dyn MarketHandler>, SettlementResult> {
        if kind == HandlerKind::Unsupported {
            let err = AppError::UnsupportedMarketType(market.market_type.clone());
            return Err(SettlementResult::failed(market, kind, &err));
        }
        self.handlers.get(&kind).ok_or_else(|| {
            let err = AppError::HandlerNotRegistered(kind.to_string());
            SettlementResult::failed(market, kind, &err)
        })
    }

    /// Settle one market. Never fails: errors and panics become error results.
    pub async fn calculate_market_result(&self, market: &Market) -> SettlementResult {
        let kind = self.classify(market);
        let handler = match self.dispatch(market, kind) {
            Ok(handler) => handler,
            Err(result) => return result,
        };

        settle_isolated(handler.as_ref(), market).await
    }

    /// Settle many markets, one concurrent task per classification.
    ///
    /// Results are grouped by classification; order across groups is not
    /// preserved. Unsupported and unregistered markets resolve without a task.
    /// Handlers isolate panics per market; a group task that still dies
    /// fails its whole group.
    pub async fn batch_calculate_markets(&self, markets: &[Market]) -> Vec<SettlementResult> {
        let mut groups: HashMap<HandlerKind, Vec<Market>> = HashMap::new();
        let mut immediate = Vec::new();
        for market in markets {
            let kind = self.classify(market);
            match self.dispatch(market, kind) {
                Ok(_) => groups.entry(kind).or_default().push(market.clone()),
                Err(result) => immediate.push(result),
            }
        }

        let mut tasks = Vec::with_capacity(groups.len());
        for kind in HandlerKind::SUPPORTED {
            let (Some(group), Some(handler)) = (groups.remove(&kind), self.handlers.get(&kind)) else {
                continue;
            };
            let group = Arc::new(group);
            let task_group = Arc::clone(&group);
            let handler = Arc::clone(handler);
            let handle = tokio::spawn(async move { handler.batch_calculate(&task_group).await });
            tasks.push((kind, group, handle));
        }

        let (meta, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|(kind, group, handle)| ((kind, group), handle))
            .unzip();
        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(markets.len());
        for ((kind, group), outcome) in meta.into_iter().zip(joined) {
            match outcome {
                Ok(group_results) => results.extend(group_results),
                Err(e) => {
                    error!(handler = %kind, markets = group.len(), "[ORCHESTRATOR] batch task failed: {e}");
                    results.extend(group.iter().map(|m| {
                        SettlementResult::failed(m, kind, &AppError::HandlerPanicked(m.label()))
                    }));
                }
            }
        }
        results.extend(immediate);

        let errors = results.iter().filter(|r| r.is_error()).count();
        info!(markets = markets.len(), settled = results.len() - errors, errors, "[ORCHESTRATOR] batch complete");
        results
    }

    /// Warm handler caches. Failures are logged and swallowed.
    pub async fn prefetch_data_for_games(&self, esbids: &[String], kinds: Option<&[HandlerKind]>) {
        let selected: Vec<(HandlerKind, &Arc<dyn MarketHandler>)> = self
            .handlers
            .iter()
            .filter(|(kind, _)| kinds.map_or(true, |kinds| kinds.contains(kind)))
            .map(|(kind, handler)| (*kind, handler))
            .collect();

        let outcomes = join_all(selected.iter().map(|(_, handler)| handler.prefetch(esbids))).await;
        for ((kind, _), outcome) in selected.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(handler = %kind, games = esbids.len(), "[ORCHESTRATOR] prefetch failed: {e}");
            }
        }
    }

    pub async fn health_check(&self) -> HashMap<HandlerKind, bool> {
        self.health_check_detailed()
            .await
            .into_iter()
            .map(|h| (h.handler, h.healthy))
            .collect()
    }

    pub async fn health_check_detailed(&self) -> Vec<HandlerHealth> {
        let probes = self.handlers.iter().map(|(kind, handler)| async move {
            let started = Instant::now();
            let healthy = handler.health_check().await;
            HandlerHealth {
                handler: *kind,
                healthy,
                checked_in_ms: started.elapsed().as_secs_f64() * 1_000.0,
            }
        });
        let mut report = join_all(probes).await;
        report.sort_by_key(|h| h.handler.to_string());
        report
    }

    pub fn clear_caches(&self) {
        for handler in self.handlers.values() {
            handler.clear_cache();
        }
    }
}
