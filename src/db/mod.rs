pub mod models;
pub mod writer;

pub use models::{load_unsettled_markets, MarketRow, ResultRow};
pub use writer::DbWriter;
