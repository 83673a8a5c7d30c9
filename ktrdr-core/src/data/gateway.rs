//! Market-data gateway — the abstract capability the pipeline consumes.
//!
//! Implementations (broker adapters, test fixtures) live outside the core;
//! everything here depends only on the trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Timeframe};
use crate::error::Result;

/// Static metadata about a tradable symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub symbol: String,
    pub exchange: String,
    /// Trading hours description, e.g. "09:30-16:00 America/New_York".
    pub trading_hours: String,
    pub tick_size: f64,
    pub currency: String,
}

/// Capability for loading historical bars and symbol metadata.
pub trait MarketDataGateway: Send + Sync {
    /// Human-readable name of this gateway implementation.
    fn name(&self) -> &str;

    /// Chronologically ordered bars in `[start, end)`.
    fn load_historical(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    fn symbol_metadata(&self, symbol: &str) -> Result<SymbolMeta>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KtrdrError;

    /// Minimal in-memory gateway used to exercise the trait object.
    struct FixtureGateway {
        bars: Vec<Bar>,
    }

    impl MarketDataGateway for FixtureGateway {
        fn name(&self) -> &str {
            "fixture"
        }

        fn load_historical(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Bar>> {
            Ok(self
                .bars
                .iter()
                .filter(|b| b.timestamp >= start && b.timestamp < end)
                .cloned()
                .collect())
        }

        fn symbol_metadata(&self, symbol: &str) -> Result<SymbolMeta> {
            if symbol != "TEST" {
                return Err(KtrdrError::Data {
                    message: format!("unknown symbol '{symbol}'"),
                    bar_index: None,
                });
            }
            Ok(SymbolMeta {
                symbol: symbol.into(),
                exchange: "SMART".into(),
                trading_hours: "09:30-16:00 America/New_York".into(),
                tick_size: 0.01,
                currency: "USD".into(),
            })
        }
    }

    #[test]
    fn gateway_trait_object_filters_range() {
        use chrono::TimeZone;
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar {
                timestamp: base + chrono::Duration::hours(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1000.0,
            })
            .collect();
        let gateway: Box<dyn MarketDataGateway> = Box::new(FixtureGateway { bars });

        let loaded = gateway
            .load_historical(
                "TEST",
                Timeframe::H1,
                base + chrono::Duration::hours(2),
                base + chrono::Duration::hours(5),
            )
            .unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(gateway.symbol_metadata("TEST").is_ok());
        assert!(gateway.symbol_metadata("NOPE").is_err());
    }
}
