//! Read-only upstream data: finalized games, plays and box scores.

pub mod records;
pub mod snapshot;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;

pub use records::{
    parse_score, require_columns, GameRecord, PlayRecord, PlayerGamelog, StatLine, StatRecord,
    TeamGamelog,
};
pub use snapshot::SettlementSnapshot;
pub use sqlite::SqliteDataSource;

/// Upstream data contract. Implementations never write.
#[async_trait]
pub trait SettlementDataSource: Send + Sync {
    /// The game row, only when the game is completed.
    async fn finalized_game(&self, esbid: &str) -> Result<Option<GameRecord>>;

    /// Non-voided plays for a game, in sequence order.
    async fn plays(&self, esbid: &str) -> Result<Vec<PlayRecord>>;

    /// Active players' box scores for a game, optionally restricted to `pids`.
    async fn player_gamelogs(
        &self,
        esbid: &str,
        pids: Option<&[String]>,
    ) -> Result<Vec<PlayerGamelog>>;

    /// Per-team sums of the game's active box-score rows.
    async fn team_gamelogs(&self, esbid: &str) -> Result<Vec<TeamGamelog>>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;

    /// Box scores for many games at once.
    async fn player_gamelogs_for_games(&self, esbids: &[String]) -> Result<Vec<PlayerGamelog>> {
        let mut rows = Vec::new();
        for esbid in esbids {
            rows.extend(self.player_gamelogs(esbid, None).await?);
        }
        Ok(rows)
    }

    /// Finalized games among `esbids`; unfinished or unknown games are omitted.
    async fn finalized_games(&self, esbids: &[String]) -> Result<Vec<GameRecord>> {
        let mut games = Vec::new();
        for esbid in esbids {
            if let Some(game) = self.finalized_game(esbid).await? {
                games.push(game);
            }
        }
        Ok(games)
    }
}
