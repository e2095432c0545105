//! Shared fixtures for unit tests.
//!
//! Game `2023091000`: KC 27 (home) vs DET 24. First touchdown is RB-1's
//! second-quarter rush; TE-1 and WR-1 score later.
//! Game `2023091100`: BUF 20 (home) vs NYJ 20.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::source::sqlite::{LONGEST_PLAY_COLUMNS, PLAYER_STAT_COLUMNS, PLAY_STAT_COLUMNS};
use crate::source::{
    GameRecord, PlayRecord, PlayerGamelog, SettlementDataSource, SettlementSnapshot, StatLine,
    TeamGamelog,
};

pub const KC_DET: &str = "2023091000";
pub const BUF_NYJ: &str = "2023091100";

pub fn game(esbid: &str, h: &str, v: &str, home: f64, away: f64) -> GameRecord {
    GameRecord {
        esbid: esbid.to_string(),
        h: h.to_string(),
        v: v.to_string(),
        home_score: Some(home),
        away_score: Some(away),
        is_final: true,
    }
}

/// Box-score row with every column present; unspecified stats are 0 and
/// longest-play columns are null.
pub fn gamelog(esbid: &str, pid: &str, tm: &str, stats: &[(&str, f64)]) -> PlayerGamelog {
    let mut line: StatLine = PLAYER_STAT_COLUMNS
        .iter()
        .map(|c| (c.to_string(), Some(0.0)))
        .collect();
    line.extend(LONGEST_PLAY_COLUMNS.iter().map(|c| (c.to_string(), None)));
    for (column, value) in stats {
        line.insert(column.to_string(), Some(*value));
    }
    PlayerGamelog {
        esbid: esbid.to_string(),
        pid: pid.to_string(),
        tm: tm.to_string(),
        opp: None,
        active: true,
        stats: line,
    }
}

pub struct PlaySpec<'a> {
    pub play_id: i64,
    pub qtr: u8,
    pub play_type: &'a str,
    pub psr: Option<&'a str>,
    pub bc: Option<&'a str>,
    pub trg: Option<&'a str>,
    pub stats: &'a [(&'a str, f64)],
}

pub fn play(esbid: &str, shape: PlaySpec<'_>) -> PlayRecord {
    let mut line: StatLine = PLAY_STAT_COLUMNS.iter().map(|c| (c.to_string(), None)).collect();
    for (column, value) in shape.stats {
        line.insert(column.to_string(), Some(*value));
    }
    PlayRecord {
        esbid: esbid.to_string(),
        play_id: shape.play_id,
        qtr: Some(shape.qtr),
        play_type: Some(shape.play_type.to_string()),
        psr_pid: shape.psr.map(str::to_string),
        bc_pid: shape.bc.map(str::to_string),
        trg_pid: shape.trg.map(str::to_string),
        stats: line,
    }
}

pub fn games() -> Vec<GameRecord> {
    vec![
        game(KC_DET, "KC", "DET", 27.0, 24.0),
        game(BUF_NYJ, "BUF", "NYJ", 20.0, 20.0),
    ]
}

pub fn gamelogs() -> Vec<PlayerGamelog> {
    vec![
        gamelog(
            KC_DET,
            "QB-1",
            "KC",
            &[("pa", 35.0), ("pc", 24.0), ("py", 275.0), ("tdp", 2.0), ("ints", 1.0), ("ra", 3.0), ("ry", 14.0), ("longest_rush", 9.0)],
        ),
        gamelog(
            KC_DET,
            "WR-1",
            "KC",
            &[("trg", 9.0), ("rec", 7.0), ("recy", 98.0), ("tdrec", 1.0), ("ra", 1.0), ("ry", 6.0), ("longest_reception", 41.0)],
        ),
        gamelog(
            KC_DET,
            "RB-1",
            "KC",
            &[("ra", 18.0), ("ry", 84.0), ("tdr", 2.0), ("rec", 3.0), ("recy", 22.0), ("longest_rush", 31.0)],
        ),
        gamelog(KC_DET, "QB-2", "DET", &[("pa", 40.0), ("pc", 28.0), ("py", 310.0), ("tdp", 1.0)]),
        gamelog(KC_DET, "TE-1", "DET", &[("rec", 5.0), ("recy", 60.0), ("tdrec", 1.0)]),
        gamelog(KC_DET, "LB-1", "DET", &[("dsk", 2.0), ("dint", 1.0)]),
        gamelog(BUF_NYJ, "QB-3", "BUF", &[("py", 220.0)]),
    ]
}

pub fn plays() -> Vec<PlayRecord> {
    let pass = |play_id, qtr, psr, trg, stats| PlaySpec {
        play_id,
        qtr,
        play_type: "PASS",
        psr: Some(psr),
        bc: None,
        trg: Some(trg),
        stats,
    };
    let rush = |play_id, qtr, bc, stats| PlaySpec {
        play_id,
        qtr,
        play_type: "RUSH",
        psr: None,
        bc: Some(bc),
        trg: None,
        stats,
    };
    vec![
        play(KC_DET, pass(1, 1, "QB-1", "WR-1", &[("pass_yds", 12.0), ("recv_yds", 12.0), ("comp", 1.0), ("pass_att", 1.0), ("td", 0.0)])),
        play(KC_DET, rush(2, 1, "RB-1", &[("rush_yds", 5.0), ("rush_att", 1.0), ("td", 0.0)])),
        play(KC_DET, pass(3, 1, "QB-1", "WR-1", &[("pass_yds", 0.0), ("comp", 0.0), ("pass_att", 1.0), ("td", 0.0)])),
        play(KC_DET, rush(4, 2, "RB-1", &[("rush_yds", 12.0), ("rush_att", 1.0), ("td", 1.0)])),
        play(KC_DET, pass(5, 2, "QB-2", "TE-1", &[("pass_yds", 25.0), ("recv_yds", 25.0), ("comp", 1.0), ("pass_att", 1.0), ("td", 1.0)])),
        play(KC_DET, pass(6, 3, "QB-1", "WR-1", &[("pass_yds", 41.0), ("recv_yds", 41.0), ("comp", 1.0), ("pass_att", 1.0), ("td", 1.0)])),
        play(KC_DET, rush(7, 4, "RB-1", &[("rush_yds", 31.0), ("rush_att", 1.0), ("td", 0.0)])),
    ]
}

pub fn snapshot() -> SettlementSnapshot {
    SettlementSnapshot::from_records(games(), plays(), gamelogs())
}

pub fn source() -> Arc<dyn SettlementDataSource> {
    Arc::new(snapshot())
}

/// Snapshot wrapper that counts upstream reads, for cache and batching tests.
#[derive(Default)]
pub struct CountingSource {
    pub inner: SettlementSnapshot,
    pub game_reads: AtomicUsize,
    pub play_reads: AtomicUsize,
    pub gamelog_reads: AtomicUsize,
    pub team_reads: AtomicUsize,
    pub fail_pings: bool,
}

impl CountingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: snapshot(),
            ..Self::default()
        })
    }

    pub fn reads(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettlementDataSource for CountingSource {
    async fn finalized_game(&self, esbid: &str) -> Result<Option<GameRecord>> {
        self.game_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.finalized_game(esbid).await
    }

    async fn plays(&self, esbid: &str) -> Result<Vec<PlayRecord>> {
        self.play_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.plays(esbid).await
    }

    async fn player_gamelogs(&self, esbid: &str, pids: Option<&[String]>) -> Result<Vec<PlayerGamelog>> {
        self.gamelog_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.player_gamelogs(esbid, pids).await
    }

    async fn team_gamelogs(&self, esbid: &str) -> Result<Vec<TeamGamelog>> {
        self.team_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.team_gamelogs(esbid).await
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_pings {
            return Err(AppError::DataSource("connection refused".to_string()));
        }
        Ok(())
    }
}
