//! Data handlers: one per market classification.
//!
//! Each handler owns a private per-game cache filled by `prefetch` or lazily
//! on first access. Entries are never invalidated; call `clear_cache` to
//! force a refetch.

pub mod game_outcome;
pub mod play_by_play;
pub mod player_gamelog;
pub mod team_stats;

use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

use crate::error::{AppError, Result};
use crate::registry::{registry, MarketMapping};
use crate::types::{HandlerKind, Market, Outcome, SettlementResult};

pub use game_outcome::GameOutcomeHandler;
pub use play_by_play::PlayByPlayHandler;
pub use player_gamelog::PlayerGamelogHandler;
pub use team_stats::TeamStatsHandler;

#[async_trait]
pub trait MarketHandler: Send + Sync {
    fn kind(&self) -> HandlerKind;

    /// Settle one market. Errors are per-market; callers turn them into results.
    async fn calculate(&self, market: &Market, mapping: &MarketMapping) -> Result<Outcome>;

    /// Bulk-load whatever `markets` (all from game `esbid`) will read.
    /// The default loads nothing, leaving each market to fetch lazily.
    async fn load_game(&self, _esbid: &str, _markets: &[&Market]) -> Result<()> {
        Ok(())
    }

    /// Warm the cache for a set of games ahead of a run.
    async fn prefetch(&self, _esbids: &[String]) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn clear_cache(&self) {}

    /// `calculate` with the error folded into the result.
    async fn settle(&self, market: &Market) -> SettlementResult {
        let mapping = registry().resolve(market);
        match self.calculate(market, mapping).await {
            Ok(outcome) => SettlementResult::settled(market, self.kind(), outcome),
            Err(e) => {
                debug!(market = %market.label(), handler = %self.kind(), "settlement failed: {e}");
                SettlementResult::failed(market, self.kind(), &e)
            }
        }
    }

    /// One bulk load per game, then each market independently. A failed load
    /// fails that game's markets only; a failed or panicking market fails
    /// only itself.
    async fn batch_calculate(&self, markets: &[Market]) -> Vec<SettlementResult> {
        let mut results = Vec::with_capacity(markets.len());
        for (esbid, game_markets) in group_by_game(markets) {
            if let Err(e) = self.load_game(&esbid, &game_markets).await {
                warn!(esbid = %esbid, handler = %self.kind(), markets = game_markets.len(), "game load failed: {e}");
                results.extend(
                    game_markets
                        .iter()
                        .map(|m| SettlementResult::failed(m, self.kind(), &e)),
                );
                continue;
            }
            for market in game_markets {
                results.push(settle_isolated(self, market).await);
            }
        }
        results
    }
}

/// `settle` with a panic turned into an error result for that market alone.
pub async fn settle_isolated<H: MarketHandler + ?Sized>(handler: &H, market: &Market) -> SettlementResult {
    match AssertUnwindSafe(handler.settle(market)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!(market = %market.label(), handler = %handler.kind(), "handler panicked");
            SettlementResult::failed(market, handler.kind(), &AppError::HandlerPanicked(market.label()))
        }
    }
}

/// Markets grouped by esbid, groups in order of first appearance.
pub fn group_by_game(markets: &[Market]) -> Vec<(String, Vec<&Market>)> {
    let mut groups: Vec<(String, Vec<&Market>)> = Vec::new();
    for market in markets {
        match groups.iter_mut().find(|(esbid, _)| *esbid == market.esbid) {
            Some((_, group)) => group.push(market),
            None => groups.push((market.esbid.clone(), vec![market])),
        }
    }
    groups
}

/// Distinct subject pids across markets, in first-seen order.
pub fn distinct_pids(markets: &[&Market]) -> Vec<String> {
    let mut pids: Vec<String> = Vec::new();
    for pid in markets.iter().filter_map(|m| m.selection_pid.as_ref()) {
        if !pids.contains(pid) {
            pids.push(pid.clone());
        }
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_preserve_first_appearance_order() {
        let markets = vec![
            Market::new("g2", "GAME_TOTAL", "OVER"),
            Market::new("g1", "GAME_TOTAL", "OVER"),
            Market::new("g2", "GAME_SPREAD", "KC"),
        ];
        let groups = group_by_game(&markets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "g2");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "g1");
    }

    #[test]
    fn distinct_pids_skips_missing_and_duplicates() {
        let a = Market::new("g1", "GAME_PASSING_YARDS", "OVER").with_pid("QB-1");
        let b = Market::new("g1", "GAME_RUSHING_YARDS", "OVER").with_pid("QB-1");
        let c = Market::new("g1", "GAME_TOTAL", "OVER");
        let d = Market::new("g1", "GAME_RECEPTIONS", "OVER").with_pid("WR-1");
        assert_eq!(distinct_pids(&[&a, &b, &c, &d]), vec!["QB-1", "WR-1"]);
    }
}
