use thiserror::Error;

pub use core_types::MarketDataError;

/// Errors surfaced by the feeder's own REST/backfill paths. [`MarketDataError`]
/// (re-exported from `core-types`) is the refusal vocabulary `snapshot`
/// returns; this enum is the broader internal failure vocabulary for
/// everything that talks to the network.
#[derive(Error, Debug)]
pub enum Error {
    #[error("market data unavailable: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),

    #[error("venue error {code}: {msg}")]
    Venue { code: i64, msg: String },

    #[error("backfill for {symbol} {timeframe} exhausted its retries: {source}")]
    BackfillExhausted {
        symbol: String,
        timeframe: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
