pub mod chart;
pub mod indicators;
pub mod ingest;
pub mod price_cache;
pub mod result_store;
pub mod rules;
pub mod scan;
pub mod universe;

pub use chart::build_chart_data;
pub use ingest::{resample_weekly, DataIngestor, SymbolSeries};
pub use price_cache::PriceCache;
pub use result_store::ResultStore;
pub use rules::RuleEngine;
pub use scan::ScanOrchestrator;
pub use universe::load_universe;
