use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use prop_settlement::api::health::HealthState;
use prop_settlement::api::latency::LatencyStats;
use prop_settlement::api::{router, ApiState};
use prop_settlement::config::{Config, SettleMode, CHANNEL_CAPACITY};
use prop_settlement::db::writer::now_ms;
use prop_settlement::db::{load_unsettled_markets, DbWriter};
use prop_settlement::error::{AppError, Result};
use prop_settlement::orchestrator::SettlementOrchestrator;
use prop_settlement::source::{SettlementDataSource, SettlementSnapshot, SqliteDataSource};
use prop_settlement::types::{Market, SelectionResult, SettlementResult};
use prop_settlement::worker::WorkerPool;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let source: Arc<dyn SettlementDataSource> = Arc::new(SqliteDataSource::new(pool.clone()));
    let orchestrator = Arc::new(SettlementOrchestrator::with_source(Arc::clone(&source)));
    info!(handlers = ?orchestrator.registered(), "Handlers registered");
    let latency = Arc::new(LatencyStats::new()?);
    let health = Arc::new(HealthState::new());

    // --- Result writer ---
    let (results_tx, results_rx) = mpsc::channel::<Vec<SettlementResult>>(CHANNEL_CAPACITY);
    let writer = DbWriter::new(pool.clone(), results_rx, Arc::clone(&health));
    let writer_handle = tokio::spawn(async move { writer.run().await });

    // --- HTTP API server ---
    let server = if cfg.api_port == 0 {
        None
    } else {
        let app = router(ApiState {
            orchestrator: Arc::clone(&orchestrator),
            latency: Arc::clone(&latency),
            health: Arc::clone(&health),
        });
        let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("HTTP API listening on {bind_addr}");
        Some(tokio::spawn(async move { axum::serve(listener, app).await }))
    };

    // --- Settlement pass ---
    let markets = load_unsettled_markets(&pool, &cfg.esbids).await?;
    let esbids: Vec<String> = markets
        .iter()
        .map(|m| m.esbid.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    info!(markets = markets.len(), games = esbids.len(), mode = ?cfg.mode, "Unsettled markets loaded");
    health.add_markets_processed(markets.len() as u64);

    let results = if markets.is_empty() {
        Vec::new()
    } else {
        match cfg.mode {
            SettleMode::Direct => settle_direct(&orchestrator, &markets, &esbids, &latency).await,
            SettleMode::Workers => settle_with_workers(&cfg, source.as_ref(), markets, &esbids, &latency).await?,
        }
    };
    log_summary(&results);

    for chunk in results.chunks(cfg.batch_size) {
        health.inc_write_queue_pending();
        results_tx
            .send(chunk.to_vec())
            .await
            .map_err(|e| AppError::ChannelSend(e.to_string()))?;
    }
    drop(results_tx);
    if let Err(e) = writer_handle.await {
        warn!("DB writer exited abnormally: {e}");
    }
    health.set_last_run_at_ms(now_ms());
    info!(written = health.counters().results_written, "Settlement pass complete");

    if let Some(server) = server {
        server.await.map_err(|e| AppError::Io(e.into()))??;
    }
    Ok(())
}

async fn settle_direct(
    orchestrator: &SettlementOrchestrator,
    markets: &[Market],
    esbids: &[String],
    latency: &LatencyStats,
) -> Vec<SettlementResult> {
    let started = Instant::now();
    orchestrator.prefetch_data_for_games(esbids, None).await;
    let results = orchestrator.batch_calculate_markets(markets).await;
    latency.record(started.elapsed());
    results
}

async fn settle_with_workers(
    cfg: &Config,
    source: &dyn SettlementDataSource,
    markets: Vec<Market>,
    esbids: &[String],
    latency: &Arc<LatencyStats>,
) -> Result<Vec<SettlementResult>> {
    let snapshot = Arc::new(SettlementSnapshot::load(source, esbids).await?);
    let pool = WorkerPool::spawn(cfg.worker_count, snapshot, Arc::clone(latency));
    let report = pool.settle(markets, cfg.batch_size).await;
    pool.shutdown().await;

    for failed in &report.failed_batches {
        // Markets in a failed batch stay unsettled and are retried next pass.
        error!(batch = failed.batch_id, markets = failed.markets, "Batch not settled: {}", failed.error);
    }
    Ok(report.results)
}

fn log_summary(results: &[SettlementResult]) {
    let count = |wanted: SelectionResult| {
        results
            .iter()
            .filter(|r| r.selection_result == Some(wanted))
            .count()
    };
    info!(
        results = results.len(),
        won = count(SelectionResult::Won),
        lost = count(SelectionResult::Lost),
        push = count(SelectionResult::Push),
        errors = results.iter().filter(|r| r.is_error()).count(),
        "[SETTLE] summary"
    );
    for r in results.iter().filter(|r| r.is_error()).take(20) {
        warn!(
            handler = %r.handler_type,
            esbid = %r.esbid,
            market_type = %r.market_type,
            "[SETTLE] {}",
            r.error.as_deref().unwrap_or_default()
        );
    }
}
