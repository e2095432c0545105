use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::health::HealthState;
use crate::error::Result;
use crate::types::SettlementResult;

/// Receives settled batches and upserts them into `prop_market_results`.
/// Runs as a dedicated background task so settlement never waits on disk.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    results_rx: mpsc::Receiver<Vec<SettlementResult>>,
    health: Arc<HealthState>,
}

impl DbWriter {
    pub fn new(
        pool: sqlx::SqlitePool,
        results_rx: mpsc::Receiver<Vec<SettlementResult>>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            pool,
            results_rx,
            health,
        }
    }

    pub async fn run(mut self) {
        while let Some(batch) = self.results_rx.recv().await {
            self.health.dec_write_queue_pending(1);
            match self.write_batch(&batch).await {
                Ok(()) => {
                    self.health.add_results_written(batch.len() as u64);
                    debug!(rows = batch.len(), "[DB] results written");
                }
                Err(e) => error!(rows = batch.len(), "DB write error: {e}"),
            }
        }
    }

    /// One transaction per batch; a re-settled market replaces its old row.
    pub async fn write_batch(&self, results: &[SettlementResult]) -> Result<()> {
        let settled_at = now_ms() as i64;
        let mut tx = self.pool.begin().await?;
        for r in results {
            let metric_value = r.metric_value.as_ref().map(|m| m.to_string());
            let selection_result = r.selection_result.map(|s| s.to_string());
            let time_type = r.time_type.map(|t| t.to_string()).unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO prop_market_results (
                    esbid, market_type, selection_pid, selection_type, selection_metric_line,
                    source_id, source_market_id, source_selection_id, time_type,
                    metric_value, selection_result, handler_type, error, settled_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (
                    esbid, market_type, selection_pid, selection_type,
                    source_id, source_market_id, source_selection_id, time_type
                ) DO UPDATE SET
                    selection_metric_line = excluded.selection_metric_line,
                    metric_value = excluded.metric_value,
                    selection_result = excluded.selection_result,
                    handler_type = excluded.handler_type,
                    error = excluded.error,
                    settled_at = excluded.settled_at
                "#,
            )
            .bind(&r.esbid)
            .bind(&r.market_type)
            .bind(r.selection_pid.as_deref().unwrap_or_default())
            .bind(&r.selection_type)
            .bind(r.selection_metric_line)
            .bind(r.source_id.as_deref().unwrap_or_default())
            .bind(r.source_market_id.as_deref().unwrap_or_default())
            .bind(r.source_selection_id.as_deref().unwrap_or_default())
            .bind(time_type)
            .bind(metric_value)
            .bind(selection_result)
            .bind(r.handler_type.to_string())
            .bind(&r.error)
            .bind(settled_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
