//! Data boundary: the on-disk OHLCV cache and the market-data gateway
//! capability. The pipeline reads bars; a separate subsystem writes them.

pub mod cache;
pub mod csv_import;
pub mod gateway;

pub use cache::OhlcvCache;
pub use csv_import::read_ohlcv_csv;
pub use gateway::{MarketDataGateway, SymbolMeta};
