use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// A canonical perpetual-futures ticker. Quote currency is implicitly USDT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Normalizes a raw ticker: upper-cases it and appends `USDT` if no quote
    /// currency is already present. Idempotent — normalizing twice equals
    /// normalizing once.
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper.ends_with("USDT") {
            Symbol(upper)
        } else {
            Symbol(format!("{upper}USDT"))
        }
    }

    pub fn is_major(&self) -> bool {
        self.0 == "BTCUSDT" || self.0 == "ETHUSDT"
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single OHLCV candlestick bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trade_count: u64,
    pub close_time: i64,
}

/// The retained timeframes the feeder keeps hot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M3,
    M15,
    H1,
    H4,
}

impl Timeframe {
    pub fn as_binance_interval(&self) -> &'static str {
        match self {
            Timeframe::M3 => "3m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    pub fn all() -> [Timeframe; 4] {
        [Timeframe::M3, Timeframe::M15, Timeframe::H1, Timeframe::H4]
    }

    pub fn from_binance_interval(interval: &str) -> Option<Self> {
        match interval {
            "3m" => Some(Timeframe::M3),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            _ => None,
        }
    }
}

/// A cached, bounded, strictly-ordered series of bars for one (symbol, timeframe).
#[derive(Debug, Clone)]
pub struct KlineSeries {
    pub bars: VecDeque<Kline>,
    pub received_at: DateTime<Utc>,
}

impl KlineSeries {
    pub const MIN_RETAINED: usize = 100;

    pub fn new() -> Self {
        Self {
            bars: VecDeque::with_capacity(Self::MIN_RETAINED + 1),
            received_at: Utc::now(),
        }
    }

    /// Upserts the in-progress bar (matching open_time) or appends a new one.
    /// Bumps `received_at` on every mutation.
    pub fn upsert(&mut self, bar: Kline, retain: usize) {
        match self.bars.back_mut() {
            Some(last) if last.open_time == bar.open_time => *last = bar,
            _ => {
                self.bars.push_back(bar);
                while self.bars.len() > retain.max(Self::MIN_RETAINED) {
                    self.bars.pop_front();
                }
            }
        }
        self.received_at = Utc::now();
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = now.signed_duration_since(self.received_at);
        age.num_milliseconds() >= 0
            && age.to_std().map(|d| d <= max_age).unwrap_or(false)
    }
}

impl Default for KlineSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// A single open-interest sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OiSnapshot {
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A technical-indicator panel for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorPanel {
    pub ema20: Decimal,
    pub macd: Decimal,
    pub macd_signal: Decimal,
    pub rsi7: Decimal,
}

/// The assembled, per-symbol market snapshot handed to the AI prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: Symbol,
    pub price: Decimal,
    pub change_1h_pct: Decimal,
    pub change_4h_pct: Decimal,
    pub panel_3m: IndicatorPanel,
    pub panel_15m: IndicatorPanel,
    pub panel_1h: IndicatorPanel,
    pub panel_4h: IndicatorPanel,
    pub oi: OiSnapshot,
    pub oi_change_4h_pct: Decimal,
    pub oi_change_period_label: String,
    pub funding_rate: Decimal,
}

/// An audit-sized stand-in for a `MarketData` snapshot: a non-cryptographic
/// content hash plus the handful of fields worth inspecting directly,
/// recorded in the decision log instead of the full multi-timeframe panel
/// (§4.G "digests (hash + key fields for audit, not full series)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataDigest {
    pub symbol: Symbol,
    pub price: Decimal,
    pub change_1h_pct: Decimal,
    pub change_4h_pct: Decimal,
    pub oi_change_4h_pct: Decimal,
    pub funding_rate: Decimal,
    pub hash: String,
}

impl From<&MarketData> for MarketDataDigest {
    fn from(market: &MarketData) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        let serialized = serde_json::to_string(market).unwrap_or_default();
        serialized.hash(&mut hasher);
        Self {
            symbol: market.symbol.clone(),
            price: market.price,
            change_1h_pct: market.change_1h_pct,
            change_4h_pct: market.change_4h_pct,
            oi_change_4h_pct: market.oi_change_4h_pct,
            funding_rate: market.funding_rate,
            hash: format!("{:016x}", hasher.finish()),
        }
    }
}

/// The side of an open position or an intended entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// An open position on the exchange for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub leverage: u8,
    pub unrealized_pnl: Decimal,
}

/// A per-trader account snapshot, taken at the start of a cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub available_margin: Decimal,
    pub total_equity: Decimal,
    pub used_margin: Decimal,
    pub positions: HashMap<Symbol, Position>,
}

impl AccountSnapshot {
    pub fn used_margin_ratio(&self) -> Decimal {
        if self.total_equity.is_zero() {
            Decimal::ZERO
        } else {
            self.used_margin / self.total_equity
        }
    }
}

/// Authentication shape for an exchange adapter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VenueAuth {
    ApiKeySecret { api_key: String, api_secret: String },
    WalletSigner { wallet_address: String, signer_private_key: String },
}

/// Whether all positions of a trader share one margin pool or each has its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Which symbols a trader considers each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolUniversePolicy {
    pub custom_symbols: Vec<Symbol>,
    pub include_default_pool: bool,
}

/// A custom system-prompt fragment, either appended to or replacing the
/// template's default body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomPrompt {
    Additive(String),
    Overriding(String),
}

/// Immutable-within-a-cycle per-trader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    pub id: String,
    pub owner_id: String,
    pub ai_ref: String,
    pub exchange_ref: String,
    pub initial_balance: Decimal,
    #[serde(with = "humantime_duration")]
    pub scan_interval: Duration,
    pub btc_eth_leverage: u8,
    pub altcoin_leverage: u8,
    pub margin_mode: MarginMode,
    pub prompt_template_ref: String,
    pub custom_prompt: Option<CustomPrompt>,
    pub symbol_universe: SymbolUniversePolicy,
}

impl TraderConfig {
    pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(180);

    pub fn effective_scan_interval(&self) -> Duration {
        self.scan_interval.max(Self::MIN_SCAN_INTERVAL)
    }

    pub fn leverage_for(&self, symbol: &Symbol) -> u8 {
        if symbol.is_major() {
            self.btc_eth_leverage
        } else {
            self.altcoin_leverage
        }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// What the AI model asked to do for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub symbol: String,
    pub action: IntentAction,
    pub side: Option<Side>,
    #[serde(rename = "size-fraction")]
    pub size_fraction: Option<f64>,
    #[serde(rename = "stop-loss")]
    pub stop_loss: Option<Decimal>,
    #[serde(rename = "take-profit")]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentAction {
    Open,
    Close,
    Hold,
}

/// What the engine decided to do after validation, for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: Symbol,
    pub op: DecisionOp,
}

/// The realized outcome of one closed position, as replayed from the
/// decision log for the §4.D "history feedback" summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: Symbol,
    pub realized_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.realized_pnl.is_sign_positive() && !self.realized_pnl.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DecisionOp {
    OpenLong {
        notional: Decimal,
        leverage: u8,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    OpenShort {
        notional: Decimal,
        leverage: u8,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    Close,
    Noop {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_quote_and_upper_cases() {
        assert_eq!(Symbol::normalize("btc").0, "BTCUSDT");
        assert_eq!(Symbol::normalize("ethusdt").0, "ETHUSDT");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = Symbol::normalize("sol");
        let twice = Symbol::normalize(&once.0);
        assert_eq!(once, twice);
    }

    #[test]
    fn kline_series_upsert_extends_in_progress_bar() {
        let mut series = KlineSeries::new();
        let bar = Kline {
            open_time: 1,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ZERO,
            quote_volume: Decimal::ZERO,
            trade_count: 0,
            close_time: 2,
        };
        series.upsert(bar, 100);
        let mut updated = bar;
        updated.close = Decimal::from(2);
        series.upsert(updated, 100);
        assert_eq!(series.bars.len(), 1);
        assert_eq!(series.bars.back().unwrap().close, Decimal::from(2));
    }

    #[test]
    fn kline_series_trims_to_retention() {
        let mut series = KlineSeries::new();
        for i in 0..150i64 {
            series.upsert(
                Kline {
                    open_time: i,
                    open: Decimal::ONE,
                    high: Decimal::ONE,
                    low: Decimal::ONE,
                    close: Decimal::ONE,
                    volume: Decimal::ZERO,
                    quote_volume: Decimal::ZERO,
                    trade_count: 0,
                    close_time: i + 1,
                },
                100,
            );
        }
        assert_eq!(series.bars.len(), 100);
        assert_eq!(series.bars.front().unwrap().open_time, 50);
    }
}
