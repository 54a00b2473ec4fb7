use thiserror::Error;

/// Errors `market-feeder::snapshot` can refuse a symbol with. Shared at the
/// `core-types` level because both the feeder and the trader loop match on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    #[error("kline cache entry is stale")]
    StaleData,
    #[error("no 4h bars available")]
    MissingH4,
    #[error("unknown symbol: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("market data unavailable: {0}")]
    MarketData(#[from] MarketDataError),
}

pub type Result<T> = std::result::Result<T, Error>;
