use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::error::Result;
use crate::source::records::{group_by_game, GameRecord, PlayRecord, PlayerGamelog, TeamGamelog};
use crate::source::SettlementDataSource;

/// Preloaded, immutable game data grouped by esbid.
///
/// Serves the same contract as the database reader without touching it, so
/// worker-side handlers settle purely from memory.
#[derive(Debug, Clone, Default)]
pub struct SettlementSnapshot {
    games: HashMap<String, GameRecord>,
    plays: HashMap<String, Vec<PlayRecord>>,
    player_gamelogs: HashMap<String, Vec<PlayerGamelog>>,
}

impl SettlementSnapshot {
    pub fn from_records(
        games: Vec<GameRecord>,
        plays: Vec<PlayRecord>,
        player_gamelogs: Vec<PlayerGamelog>,
    ) -> Self {
        let mut plays = group_by_game(plays, |p| p.esbid.as_str());
        for game_plays in plays.values_mut() {
            game_plays.sort_by_key(|p| p.play_id);
        }
        Self {
            games: games
                .into_iter()
                .filter(|g| g.is_final)
                .map(|g| (g.esbid.clone(), g))
                .collect(),
            plays,
            player_gamelogs: group_by_game(player_gamelogs, |g| g.esbid.as_str()),
        }
    }

    /// Pull everything the given games need from another source.
    pub async fn load(source: &dyn SettlementDataSource, esbids: &[String]) -> Result<Self> {
        let games = source.finalized_games(esbids).await?;
        let mut plays = Vec::new();
        for game in &games {
            plays.extend(source.plays(&game.esbid).await?);
        }
        let gamelogs = source.player_gamelogs_for_games(esbids).await?;

        let snapshot = Self::from_records(games, plays, gamelogs);
        info!(
            games = snapshot.game_count(),
            plays = snapshot.plays.values().map(Vec::len).sum::<usize>(),
            gamelogs = snapshot.player_gamelogs.values().map(Vec::len).sum::<usize>(),
            "[SNAPSHOT] preloaded settlement data"
        );
        Ok(snapshot)
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }
}

#[async_trait]
impl SettlementDataSource for SettlementSnapshot {
    async fn finalized_game(&self, esbid: &str) -> Result<Option<GameRecord>> {
        Ok(self.games.get(esbid).cloned())
    }

    async fn plays(&self, esbid: &str) -> Result<Vec<PlayRecord>> {
        Ok(self.plays.get(esbid).cloned().unwrap_or_default())
    }

    async fn player_gamelogs(
        &self,
        esbid: &str,
        pids: Option<&[String]>,
    ) -> Result<Vec<PlayerGamelog>> {
        let rows = self.player_gamelogs.get(esbid).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|r| r.active)
            .filter(|r| pids.map_or(true, |pids| pids.contains(&r.pid)))
            .cloned()
            .collect())
    }

    async fn team_gamelogs(&self, esbid: &str) -> Result<Vec<TeamGamelog>> {
        let rows = self.player_gamelogs.get(esbid).map(Vec::as_slice).unwrap_or_default();
        Ok(TeamGamelog::aggregate(rows))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
