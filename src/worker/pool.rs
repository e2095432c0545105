use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::latency::LatencyStats;
use crate::config::CHANNEL_CAPACITY;
use crate::error::{AppError, Result};
use crate::source::SettlementSnapshot;
use crate::types::{Market, SettlementResult};
use crate::worker::{BatchRequest, SettlementBatch, SettlementWorker, SharedQueue};

#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub batch_id: u64,
    pub markets: usize,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct PoolReport {
    pub results: Vec<SettlementResult>,
    pub failed_batches: Vec<FailedBatch>,
}

/// Fixed set of workers pulling from one queue.
pub struct WorkerPool {
    tx: mpsc::Sender<BatchRequest>,
    workers: Vec<JoinHandle<()>>,
    next_batch_id: AtomicU64,
    latency: Arc<LatencyStats>,
}

impl WorkerPool {
    pub fn spawn(worker_count: usize, snapshot: Arc<SettlementSnapshot>, latency: Arc<LatencyStats>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        let workers = (0..worker_count.max(1))
            .map(|id| {
                let worker = SettlementWorker::new(id, Arc::clone(&snapshot));
                tokio::spawn(worker.run(Arc::clone(&queue)))
            })
            .collect::<Vec<_>>();
        info!(workers = workers.len(), games = snapshot.game_count(), "[POOL] workers ready");
        Self {
            tx,
            workers,
            next_batch_id: AtomicU64::new(1),
            latency,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Send one batch and wait for its results.
    pub async fn submit(&self, markets: Vec<Market>) -> (u64, usize, Result<Vec<SettlementResult>>) {
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let count = markets.len();
        let started = Instant::now();
        let (reply, answer) = oneshot::channel();
        let request = BatchRequest {
            batch: SettlementBatch { batch_id, markets },
            reply,
        };

        let outcome = match self.tx.send(request).await {
            Ok(()) => answer.await.unwrap_or_else(|_| {
                Err(AppError::ChannelSend(format!("reply for batch {batch_id} was dropped")))
            }),
            Err(e) => Err(AppError::ChannelSend(e.to_string())),
        };
        self.latency.record(started.elapsed());
        (batch_id, count, outcome)
    }

    /// Split `markets` into batches of `batch_size`, settle them across the
    /// pool and reassemble the results.
    pub async fn settle(&self, markets: Vec<Market>, batch_size: usize) -> PoolReport {
        let batches: Vec<Vec<Market>> = markets
            .chunks(batch_size.max(1))
            .map(<[Market]>::to_vec)
            .collect();
        let outcomes = join_all(batches.into_iter().map(|batch| self.submit(batch))).await;

        let mut report = PoolReport::default();
        for (batch_id, count, outcome) in outcomes {
            match outcome {
                Ok(results) => report.results.extend(results),
                Err(e) => {
                    warn!(batch = batch_id, markets = count, "[POOL] batch failed: {e}");
                    report.failed_batches.push(FailedBatch {
                        batch_id,
                        markets: count,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            results = report.results.len(),
            failed_batches = report.failed_batches.len(),
            "[POOL] settle complete"
        );
        report
    }

    /// Close the queue and wait for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!("[POOL] worker exited abnormally: {e}");
            }
        }
    }
}
