//! Snapshot-backed settlement workers.
//!
//! A worker owns its own handlers over a shared, immutable
//! [`SettlementSnapshot`] and never touches the database. Every market
//! settles into an OPEN and a CLOSE result carrying the same outcome.

pub mod pool;

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use crate::error::{AppError, Result};
use crate::handlers::{GameOutcomeHandler, PlayByPlayHandler, PlayerGamelogHandler};
use crate::orchestrator::SettlementOrchestrator;
use crate::source::{SettlementDataSource, SettlementSnapshot};
use crate::types::{Market, SettlementResult, TimeType};

pub use pool::{FailedBatch, PoolReport, WorkerPool};

#[derive(Debug, Clone)]
pub struct SettlementBatch {
    pub batch_id: u64,
    pub markets: Vec<Market>,
}

/// A batch plus the channel its results go back on.
pub struct BatchRequest {
    pub batch: SettlementBatch,
    pub reply: oneshot::Sender<Result<Vec<SettlementResult>>>,
}

/// Work queue shared by every worker in a pool.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<BatchRequest>>>;

pub struct SettlementWorker {
    id: usize,
    orchestrator: SettlementOrchestrator,
}

impl SettlementWorker {
    pub fn new(id: usize, snapshot: Arc<SettlementSnapshot>) -> Self {
        let source: Arc<dyn SettlementDataSource> = snapshot;
        let mut orchestrator = SettlementOrchestrator::new();
        orchestrator.register(Arc::new(PlayerGamelogHandler::new(Arc::clone(&source))));
        orchestrator.register(Arc::new(PlayByPlayHandler::new(Arc::clone(&source))));
        orchestrator.register(Arc::new(GameOutcomeHandler::new(source)));
        Self { id, orchestrator }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Settle a batch, or fail it as a whole with a structured worker error.
    pub async fn settle_batch(&self, batch: &SettlementBatch) -> Result<Vec<SettlementResult>> {
        let settled = AssertUnwindSafe(self.orchestrator.batch_calculate_markets(&batch.markets))
            .catch_unwind()
            .await
            .map_err(|_| AppError::Worker {
                worker_id: self.id,
                batch_id: batch.batch_id,
                message: "settlement panicked".to_string(),
            })?;

        Ok(settled
            .into_iter()
            .flat_map(|result| {
                [
                    result.clone().with_time_type(TimeType::Open),
                    result.with_time_type(TimeType::Close),
                ]
            })
            .collect())
    }

    /// Pull batches off the shared queue until every sender is gone.
    pub async fn run(self, queue: SharedQueue) {
        info!(worker = self.id, "[WORKER] started");
        loop {
            let request = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            let Some(BatchRequest { batch, reply }) = request else {
                break;
            };

            debug!(worker = self.id, batch = batch.batch_id, markets = batch.markets.len(), "[WORKER] batch received");
            let outcome = self.settle_batch(&batch).await;
            if let Err(e) = &outcome {
                error!(worker = self.id, batch = batch.batch_id, "[WORKER] {e}");
            }
            if reply.send(outcome).is_err() {
                debug!(worker = self.id, batch = batch.batch_id, "[WORKER] requester went away");
            }
        }
        info!(worker = self.id, "[WORKER] queue closed, exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, KC_DET};
    use crate::types::{HandlerKind, SelectionResult};

    fn worker() -> SettlementWorker {
        SettlementWorker::new(7, Arc::new(testing::snapshot()))
    }

    #[tokio::test]
    async fn every_market_yields_open_and_close() {
        let batch = SettlementBatch {
            batch_id: 1,
            markets: vec![
                Market::new(KC_DET, "GAME_PASSING_YARDS", "OVER").with_pid("QB-1").with_line(274.5),
                Market::new(KC_DET, "FIRST_TOUCHDOWN_SCORER", "YES").with_pid("RB-1"),
                Market::new(KC_DET, "GAME_TOTAL", "UNDER").with_line(51.0),
            ],
        };
        let worker = worker();
        assert_eq!(worker.id(), 7);
        let results = worker.settle_batch(&batch).await.unwrap();
        assert_eq!(results.len(), 6);

        for pair in results.chunks(2) {
            assert_eq!(pair[0].time_type, Some(TimeType::Open));
            assert_eq!(pair[1].time_type, Some(TimeType::Close));
            assert_eq!(pair[0].metric_value, pair[1].metric_value);
            assert_eq!(pair[0].selection_result, pair[1].selection_result);
            assert_eq!(pair[0].market_type, pair[1].market_type);
        }
        let total = results.iter().find(|r| r.market_type == "GAME_TOTAL").unwrap();
        assert_eq!(total.selection_result, Some(SelectionResult::Push));
    }

    #[tokio::test]
    async fn team_markets_have_no_snapshot_handler() {
        let batch = SettlementBatch {
            batch_id: 2,
            markets: vec![Market::new(KC_DET, "TEAM_SACKS", "DET").with_line(1.5)],
        };
        let results = worker().settle_batch(&batch).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.handler_type == HandlerKind::TeamStats && r.is_error()));
    }

    #[tokio::test]
    async fn run_answers_over_the_queue() {
        let (tx, rx) = mpsc::channel(4);
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        let handle = tokio::spawn(worker().run(queue));

        let (reply, answer) = oneshot::channel();
        let batch = SettlementBatch {
            batch_id: 3,
            markets: vec![Market::new(KC_DET, "GAME_MONEYLINE", "KC")],
        };
        tx.send(BatchRequest { batch, reply }).await.unwrap();
        let results = answer.await.unwrap().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].selection_result, Some(SelectionResult::Won));

        drop(tx);
        handle.await.unwrap();
    }
}
