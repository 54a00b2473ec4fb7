pub mod error;
pub mod types;

pub use error::{Error, MarketDataError, Result};
pub use types::{
    AccountSnapshot, CustomPrompt, Decision, DecisionOp, IndicatorPanel, Intent, IntentAction,
    Kline, KlineSeries, MarginMode, MarketData, MarketDataDigest, OiSnapshot, Position, Side,
    Symbol, SymbolUniversePolicy, Timeframe, TradeOutcome, TraderConfig, VenueAuth,
};
