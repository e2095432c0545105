//! Row types for the market input table and the crate-owned result table.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::types::Market;

/// A `prop_markets` row. Upstream ids may be stored as integers, so the
/// query casts everything identifying to text.
#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub esbid: String,
    pub market_type: String,
    pub selection_pid: Option<String>,
    pub selection_type: String,
    pub selection_metric_line: Option<f64>,
    pub source_id: Option<String>,
    pub source_market_id: Option<String>,
    pub source_selection_id: Option<String>,
}

impl From<MarketRow> for Market {
    fn from(row: MarketRow) -> Self {
        Market {
            selection_pid: row.selection_pid,
            selection_metric_line: row.selection_metric_line,
            source_id: row.source_id,
            source_market_id: row.source_market_id,
            source_selection_id: row.source_selection_id,
            ..Market::new(&row.esbid, &row.market_type, &row.selection_type)
        }
    }
}

const UNSETTLED_MARKETS: &str = r#"
    SELECT CAST(m.esbid AS TEXT) AS esbid,
           m.market_type,
           CAST(m.selection_pid AS TEXT) AS selection_pid,
           m.selection_type,
           CAST(m.selection_metric_line AS REAL) AS selection_metric_line,
           CAST(m.source_id AS TEXT) AS source_id,
           CAST(m.source_market_id AS TEXT) AS source_market_id,
           CAST(m.source_selection_id AS TEXT) AS source_selection_id
    FROM prop_markets m
    WHERE NOT EXISTS (
        SELECT 1 FROM prop_market_results r
        WHERE r.esbid = CAST(m.esbid AS TEXT)
          AND r.market_type = m.market_type
          AND r.selection_pid = COALESCE(CAST(m.selection_pid AS TEXT), '')
          AND r.selection_type = m.selection_type
          AND r.source_id = COALESCE(CAST(m.source_id AS TEXT), '')
          AND r.source_market_id = COALESCE(CAST(m.source_market_id AS TEXT), '')
          AND r.source_selection_id = COALESCE(CAST(m.source_selection_id AS TEXT), '')
          AND r.error IS NULL
    )
"#;

/// Markets with no successful result yet, optionally limited to `esbids`.
/// Markets whose last attempt failed are returned again.
pub async fn load_unsettled_markets(pool: &SqlitePool, esbids: &[String]) -> Result<Vec<Market>> {
    let mut qb = QueryBuilder::<Sqlite>::new(UNSETTLED_MARKETS);
    if !esbids.is_empty() {
        qb.push(" AND CAST(m.esbid AS TEXT) IN (");
        let mut ids = qb.separated(", ");
        for esbid in esbids {
            ids.push_bind(esbid.clone());
        }
        ids.push_unseparated(")");
    }
    qb.push(" ORDER BY m.esbid, m.market_type");

    let rows: Vec<MarketRow> = qb.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(Market::from).collect())
}

/// A persisted `prop_market_results` row.
#[derive(Debug, sqlx::FromRow)]
pub struct ResultRow {
    pub id: i64,
    pub esbid: String,
    pub market_type: String,
    pub selection_pid: String,
    pub selection_type: String,
    pub selection_metric_line: Option<f64>,
    pub source_id: String,
    pub source_market_id: String,
    pub source_selection_id: String,
    pub time_type: String,
    pub metric_value: Option<String>,
    pub selection_result: Option<String>,
    pub handler_type: String,
    pub error: Option<String>,
    pub settled_at: i64,
}
