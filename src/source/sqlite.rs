use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Decode, QueryBuilder, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::source::records::{parse_score, GameRecord, PlayRecord, PlayerGamelog, StatLine, TeamGamelog};
use crate::source::SettlementDataSource;

/// Per-player integer stat columns carried on every box-score row.
pub const PLAYER_STAT_COLUMNS: &[&str] = &[
    "pa", "pc", "py", "ints", "tdp", "ra", "ry", "tdr", "trg", "rec", "recy", "tdrec", "fuml",
    "dsk", "dint",
];

/// Joined from the receiving/rushing detail tables.
pub const LONGEST_PLAY_COLUMNS: &[&str] = &["longest_reception", "longest_rush"];

/// Summed per team by the team-aggregate query.
pub const TEAM_STAT_COLUMNS: &[&str] = &["py", "ry", "recy", "tdp", "tdr", "tdrec", "dsk", "dint"];

/// Per-play stat and boolean columns.
pub const PLAY_STAT_COLUMNS: &[&str] = &[
    "pass_yds", "rush_yds", "recv_yds", "comp", "pass_att", "rush_att", "td", "ints", "sk",
];

const PLAYER_GAMELOG_SELECT: &str = r#"
    SELECT pg.esbid, pg.pid, pg.tm, pg.opp, pg.active,
           pg.pa, pg.pc, pg.py, pg.ints, pg.tdp, pg.ra, pg.ry, pg.tdr, pg.trg,
           pg.rec, pg.recy, pg.tdrec, pg.fuml, pg.dsk, pg.dint,
           rcv.longest_reception, rsh.longest_rush
    FROM player_gamelogs pg
    LEFT JOIN player_receiving_gamelogs rcv ON rcv.esbid = pg.esbid AND rcv.pid = pg.pid
    LEFT JOIN player_rushing_gamelogs rsh ON rsh.esbid = pg.esbid AND rsh.pid = pg.pid
    WHERE pg.active = 1
"#;

const GAME_SELECT: &str = r#"
    SELECT esbid, h, v, home_score, away_score, status
    FROM nfl_games
    WHERE status LIKE 'FINAL%'
"#;

/// SQLite-backed upstream reader.
#[derive(Clone)]
pub struct SqliteDataSource {
    pool: SqlitePool,
}

impl SqliteDataSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_player_gamelogs(
        &self,
        esbids: &[String],
        pids: Option<&[String]>,
    ) -> Result<Vec<PlayerGamelog>> {
        if esbids.is_empty() || pids.is_some_and(|p| p.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(PLAYER_GAMELOG_SELECT);
        qb.push(" AND pg.esbid IN (");
        let mut ids = qb.separated(", ");
        for esbid in esbids {
            ids.push_bind(esbid.clone());
        }
        ids.push_unseparated(")");
        if let Some(pids) = pids {
            qb.push(" AND pg.pid IN (");
            let mut players = qb.separated(", ");
            for pid in pids {
                players.push_bind(pid.clone());
            }
            players.push_unseparated(")");
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        debug!(games = esbids.len(), rows = rows.len(), "[SOURCE] player gamelogs fetched");
        rows.iter().map(player_gamelog_from_row).collect()
    }
}

#[async_trait]
impl SettlementDataSource for SqliteDataSource {
    async fn finalized_game(&self, esbid: &str) -> Result<Option<GameRecord>> {
        let sql = format!("{GAME_SELECT} AND esbid = ?");
        let row = sqlx::query(&sql).bind(esbid).fetch_optional(&self.pool).await?;
        row.as_ref().map(game_from_row).transpose()
    }

    async fn plays(&self, esbid: &str) -> Result<Vec<PlayRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT esbid, play_id, qtr, play_type, psr_pid, bc_pid, trg_pid,
                   pass_yds, rush_yds, recv_yds, comp, pass_att, rush_att, td, ints, sk
            FROM nfl_plays
            WHERE esbid = ? AND COALESCE(voided, 0) = 0
            ORDER BY play_id
            "#,
        )
        .bind(esbid)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(play_from_row).collect()
    }

    async fn player_gamelogs(
        &self,
        esbid: &str,
        pids: Option<&[String]>,
    ) -> Result<Vec<PlayerGamelog>> {
        self.fetch_player_gamelogs(&[esbid.to_string()], pids).await
    }

    async fn team_gamelogs(&self, esbid: &str) -> Result<Vec<TeamGamelog>> {
        let sums = TEAM_STAT_COLUMNS
            .iter()
            .map(|c| format!("SUM({c}) AS {c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT esbid, tm, {sums} FROM player_gamelogs \
             WHERE esbid = ? AND active = 1 GROUP BY esbid, tm ORDER BY tm"
        );
        let rows = sqlx::query(&sql).bind(esbid).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(TeamGamelog {
                    esbid: required_text(row, "esbid")?,
                    tm: required_text(row, "tm")?,
                    stats: stat_line(row, TEAM_STAT_COLUMNS)?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn player_gamelogs_for_games(&self, esbids: &[String]) -> Result<Vec<PlayerGamelog>> {
        self.fetch_player_gamelogs(esbids, None).await
    }

    async fn finalized_games(&self, esbids: &[String]) -> Result<Vec<GameRecord>> {
        if esbids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(GAME_SELECT);
        qb.push(" AND esbid IN (");
        let mut ids = qb.separated(", ");
        for esbid in esbids {
            ids.push_bind(esbid.clone());
        }
        ids.push_unseparated(")");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(game_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

// Upstream tables are loosely typed (ids may be INTEGER or TEXT, scores may be
// TEXT), so cells are decoded from their runtime storage class.

fn decode_err(e: sqlx::error::BoxDynError) -> AppError {
    AppError::DataSource(e.to_string())
}

fn cell_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    let raw = row.try_get_raw(column)?;
    if raw.is_null() {
        return Ok(None);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => <i64 as Decode<'_, Sqlite>>::decode(raw).map(|v| v.to_string()),
        "REAL" => <f64 as Decode<'_, Sqlite>>::decode(raw).map(|v| v.to_string()),
        _ => <String as Decode<'_, Sqlite>>::decode(raw),
    }
    .map_err(decode_err)?;
    Ok(Some(value))
}

fn required_text(row: &SqliteRow, column: &str) -> Result<String> {
    cell_text(row, column)?
        .ok_or_else(|| AppError::DataSource(format!("column {column} is null")))
}

fn cell_number(row: &SqliteRow, column: &str) -> Result<Option<f64>> {
    let raw = row.try_get_raw(column)?;
    if raw.is_null() {
        return Ok(None);
    }
    if raw.type_info().name() == "TEXT" {
        let text = <String as Decode<'_, Sqlite>>::decode(raw).map_err(decode_err)?;
        return Ok(parse_score(&text));
    }
    <f64 as Decode<'_, Sqlite>>::decode(raw).map(Some).map_err(decode_err)
}

fn stat_line(row: &SqliteRow, columns: &[&str]) -> Result<StatLine> {
    columns
        .iter()
        .map(|c| Ok((c.to_string(), cell_number(row, c)?)))
        .collect()
}

fn player_gamelog_from_row(row: &SqliteRow) -> Result<PlayerGamelog> {
    let mut stats = stat_line(row, PLAYER_STAT_COLUMNS)?;
    stats.extend(stat_line(row, LONGEST_PLAY_COLUMNS)?);
    Ok(PlayerGamelog {
        esbid: required_text(row, "esbid")?,
        pid: required_text(row, "pid")?,
        tm: required_text(row, "tm")?,
        opp: cell_text(row, "opp")?,
        active: cell_number(row, "active")?.is_some_and(|v| v != 0.0),
        stats,
    })
}

fn play_from_row(row: &SqliteRow) -> Result<PlayRecord> {
    Ok(PlayRecord {
        esbid: required_text(row, "esbid")?,
        play_id: cell_number(row, "play_id")?.unwrap_or_default() as i64,
        qtr: cell_number(row, "qtr")?.map(|q| q as u8),
        play_type: cell_text(row, "play_type")?,
        psr_pid: cell_text(row, "psr_pid")?,
        bc_pid: cell_text(row, "bc_pid")?,
        trg_pid: cell_text(row, "trg_pid")?,
        stats: stat_line(row, PLAY_STAT_COLUMNS)?,
    })
}

fn game_from_row(row: &SqliteRow) -> Result<GameRecord> {
    let status = cell_text(row, "status")?.unwrap_or_default();
    Ok(GameRecord {
        esbid: required_text(row, "esbid")?,
        h: required_text(row, "h")?,
        v: required_text(row, "v")?,
        home_score: cell_number(row, "home_score")?,
        away_score: cell_number(row, "away_score")?,
        is_final: status.to_ascii_uppercase().starts_with("FINAL"),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) const UPSTREAM_SCHEMA: &[&str] = &[
        "CREATE TABLE nfl_games (esbid INTEGER, h TEXT, v TEXT, home_score, away_score, status TEXT)",
        "CREATE TABLE nfl_plays (esbid INTEGER, play_id INTEGER, qtr INTEGER, play_type TEXT,
            psr_pid TEXT, bc_pid TEXT, trg_pid TEXT, pass_yds INTEGER, rush_yds INTEGER,
            recv_yds INTEGER, comp INTEGER, pass_att INTEGER, rush_att INTEGER, td INTEGER,
            ints INTEGER, sk INTEGER, voided INTEGER)",
        "CREATE TABLE player_gamelogs (esbid INTEGER, pid TEXT, tm TEXT, opp TEXT, active INTEGER,
            pa INTEGER, pc INTEGER, py INTEGER, ints INTEGER, tdp INTEGER, ra INTEGER, ry INTEGER,
            tdr INTEGER, trg INTEGER, rec INTEGER, recy INTEGER, tdrec INTEGER, fuml INTEGER,
            dsk INTEGER, dint INTEGER)",
        "CREATE TABLE player_receiving_gamelogs (esbid INTEGER, pid TEXT, longest_reception INTEGER)",
        "CREATE TABLE player_rushing_gamelogs (esbid INTEGER, pid TEXT, longest_rush INTEGER)",
    ];

    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for stmt in UPSTREAM_SCHEMA {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }
        pool
    }

    async fn seed(pool: &SqlitePool) {
        for stmt in [
            "INSERT INTO nfl_games VALUES (2023091000, 'KC', 'DET', 27, '24', 'FINAL')",
            "INSERT INTO nfl_games VALUES (2023091001, 'BUF', 'NYJ', 'TBD', 22, 'FINAL_OVERTIME')",
            "INSERT INTO nfl_games VALUES (2023091002, 'SF', 'PIT', NULL, NULL, 'SCHEDULED')",
            "INSERT INTO player_gamelogs VALUES (2023091000, 'QB-1', 'KC', 'DET', 1,
                35, 24, 275, 1, 2, 3, 14, 0, 0, 0, 0, 0, 0, 0, 0)",
            "INSERT INTO player_gamelogs VALUES (2023091000, 'WR-1', 'KC', 'DET', 1,
                0, 0, 0, 0, 0, 1, 6, 0, 9, 7, 98, 1, 0, 0, 0)",
            "INSERT INTO player_gamelogs VALUES (2023091000, 'LB-1', 'DET', 'KC', 1,
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 1)",
            "INSERT INTO player_gamelogs VALUES (2023091000, 'BENCH', 'KC', 'DET', 0,
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0)",
            "INSERT INTO player_receiving_gamelogs VALUES (2023091000, 'WR-1', 41)",
            "INSERT INTO player_rushing_gamelogs VALUES (2023091000, 'QB-1', 9)",
            "INSERT INTO nfl_plays VALUES (2023091000, 1, 1, 'PASS', 'QB-1', NULL, 'WR-1',
                12, NULL, 12, 1, 1, NULL, 0, 0, 0, 0)",
            "INSERT INTO nfl_plays VALUES (2023091000, 2, 1, 'PASS', 'QB-1', NULL, 'WR-1',
                30, NULL, 30, 1, 1, NULL, 1, 0, 0, 1)",
            "INSERT INTO nfl_plays VALUES (2023091000, 3, 1, 'RUSH', NULL, 'QB-1', NULL,
                NULL, 9, NULL, 0, 0, 1, 0, 0, 0, NULL)",
        ] {
            sqlx::query(stmt).execute(pool).await.unwrap();
        }
    }

    #[tokio::test]
    async fn finalized_game_parses_mixed_score_storage() {
        let pool = memory_pool().await;
        seed(&pool).await;
        let source = SqliteDataSource::new(pool);

        let game = source.finalized_game("2023091000").await.unwrap().unwrap();
        assert_eq!(game.esbid, "2023091000");
        assert_eq!(game.h, "KC");
        assert_eq!(game.home_score, Some(27.0));
        assert_eq!(game.away_score, Some(24.0));
        assert!(game.is_final);

        let overtime = source.finalized_game("2023091001").await.unwrap().unwrap();
        assert_eq!(overtime.home_score, None, "non-numeric score must read as missing");

        assert!(source.finalized_game("2023091002").await.unwrap().is_none());
        assert!(source.finalized_game("404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn player_gamelogs_join_longest_plays_and_skip_inactive() {
        let pool = memory_pool().await;
        seed(&pool).await;
        let source = SqliteDataSource::new(pool);

        let rows = source.player_gamelogs("2023091000", None).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.pid != "BENCH"));

        let wr = rows.iter().find(|r| r.pid == "WR-1").unwrap();
        assert_eq!(wr.stats["recy"], Some(98.0));
        assert_eq!(wr.stats["longest_reception"], Some(41.0));
        assert_eq!(wr.stats["longest_rush"], None);

        let only_qb = source
            .player_gamelogs("2023091000", Some(&["QB-1".to_string()]))
            .await
            .unwrap();
        assert_eq!(only_qb.len(), 1);
        assert_eq!(only_qb[0].stats["py"], Some(275.0));
        assert_eq!(only_qb[0].stats["longest_rush"], Some(9.0));
    }

    #[tokio::test]
    async fn plays_exclude_voided_and_keep_sequence() {
        let pool = memory_pool().await;
        seed(&pool).await;
        let source = SqliteDataSource::new(pool);

        let plays = source.plays("2023091000").await.unwrap();
        assert_eq!(plays.iter().map(|p| p.play_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(plays[0].trg_pid.as_deref(), Some("WR-1"));
        assert_eq!(plays[1].stats["rush_yds"], Some(9.0));
        assert_eq!(plays[0].stats["rush_yds"], None);
    }

    #[tokio::test]
    async fn team_gamelogs_group_active_rows() {
        let pool = memory_pool().await;
        seed(&pool).await;
        let source = SqliteDataSource::new(pool);

        let teams = source.team_gamelogs("2023091000").await.unwrap();
        assert_eq!(teams.len(), 2);
        let kc = teams.iter().find(|t| t.tm == "KC").unwrap();
        assert_eq!(kc.stats["py"], Some(275.0));
        assert_eq!(kc.stats["ry"], Some(20.0));
        let det = teams.iter().find(|t| t.tm == "DET").unwrap();
        assert_eq!(det.stats["dsk"], Some(2.0));
    }

    #[tokio::test]
    async fn bulk_reads_cover_many_games() {
        let pool = memory_pool().await;
        seed(&pool).await;
        let source = SqliteDataSource::new(pool);
        source.ping().await.unwrap();

        let ids = vec![
            "2023091000".to_string(),
            "2023091001".to_string(),
            "2023091002".to_string(),
        ];
        let games = source.finalized_games(&ids).await.unwrap();
        assert_eq!(games.len(), 2);
        let logs = source.player_gamelogs_for_games(&ids).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(source.finalized_games(&[]).await.unwrap().is_empty());
    }
}
