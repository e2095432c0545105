//! Settlement engine for NFL player and game prop markets.
//!
//! Markets are classified into a handler family through the static
//! [`registry`], evaluated against finalized game data by a
//! [`handlers::MarketHandler`] and collected by the
//! [`orchestrator::SettlementOrchestrator`]. Large backlogs can instead be
//! fanned out to a [`worker::WorkerPool`] over a preloaded snapshot.

pub mod api;
pub mod calculator;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;
