use crate::indicators::compute_panel;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use core_types::{
    IndicatorPanel, Kline, KlineSeries, MarketData, MarketDataError, OiSnapshot, Symbol, Timeframe,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// `received-at` must be no older than this for any read path to trust the
/// cache — the 3 m entry is the binding one, but the bound is applied
/// uniformly since an in-progress 4 h bar is refreshed on every 3 m tick.
const FRESHNESS_ENVELOPE: Duration = Duration::from_secs(15 * 60);

/// How many consecutive identical, zero-volume 3 m closes constitute an
/// upstream cache failure rather than a quiet market.
const FROZEN_WINDOW: usize = 5;

pub const OI_RETAIN: usize = 20;

#[derive(Default)]
struct SymbolEntry {
    series: HashMap<Timeframe, KlineSeries>,
    oi_history: VecDeque<OiSnapshot>,
    funding_rate: Decimal,
}

/// The feeder's hot cache: per-symbol kline series across the tracked
/// timeframes plus OI history. Entries are created lazily and never pruned
/// except by their own retention bounds (they live as long as the process).
pub struct MarketCache {
    symbols: RwLock<HashMap<Symbol, SymbolEntry>>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert_bar(&self, symbol: &Symbol, timeframe: Timeframe, bar: Kline, retain: usize) {
        let mut guard = self.symbols.write().await;
        let entry = guard.entry(symbol.clone()).or_default();
        entry
            .series
            .entry(timeframe)
            .or_insert_with(KlineSeries::new)
            .upsert(bar, retain);
    }

    pub async fn set_funding_rate(&self, symbol: &Symbol, rate: Decimal) {
        let mut guard = self.symbols.write().await;
        guard.entry(symbol.clone()).or_default().funding_rate = rate;
    }

    /// Appends an OI sample, keeping the history strictly time-ordered and
    /// trimmed to [`OI_RETAIN`].
    pub async fn push_oi(&self, symbol: &Symbol, sample: OiSnapshot) {
        let mut guard = self.symbols.write().await;
        let entry = guard.entry(symbol.clone()).or_default();
        if let Some(last) = entry.oi_history.back() {
            if sample.timestamp <= last.timestamp {
                return;
            }
        }
        entry.oi_history.push_back(sample);
        while entry.oi_history.len() > OI_RETAIN {
            entry.oi_history.pop_front();
        }
    }

    pub async fn has_symbol(&self, symbol: &Symbol) -> bool {
        self.symbols.read().await.contains_key(symbol)
    }

    pub async fn tracked_symbols(&self) -> Vec<Symbol> {
        self.symbols.read().await.keys().cloned().collect()
    }

    /// Assembles a [`MarketData`] panel for `symbol`, or refuses per §4.A.
    pub async fn snapshot(
        &self,
        symbol: &Symbol,
        now: DateTime<Utc>,
    ) -> Result<MarketData, MarketDataError> {
        let guard = self.symbols.read().await;
        let entry = guard
            .get(symbol)
            .ok_or_else(|| MarketDataError::Unknown(symbol.0.clone()))?;

        let m3 = entry
            .series
            .get(&Timeframe::M3)
            .ok_or(MarketDataError::StaleData)?;
        if !m3.is_fresh(now, FRESHNESS_ENVELOPE) {
            return Err(MarketDataError::StaleData);
        }
        if is_frozen_and_untraded(&m3.bars) {
            return Err(MarketDataError::StaleData);
        }
        if is_frozen_but_traded(&m3.bars) {
            tracing::warn!(symbol = %symbol.0, "3m price frozen but volume present; treating as low-volatility market");
        }

        let h4 = entry
            .series
            .get(&Timeframe::H4)
            .filter(|s| !s.bars.is_empty())
            .ok_or(MarketDataError::MissingH4)?;

        let price = m3
            .bars
            .back()
            .map(|b| b.close)
            .ok_or(MarketDataError::StaleData)?;

        let panel_3m = compute_panel(&m3.bars).ok_or(MarketDataError::StaleData)?;
        let panel_15m = entry
            .series
            .get(&Timeframe::M15)
            .and_then(|s| compute_panel(&s.bars))
            .unwrap_or_else(empty_panel);
        let panel_1h = entry
            .series
            .get(&Timeframe::H1)
            .and_then(|s| compute_panel(&s.bars))
            .unwrap_or_else(empty_panel);
        let panel_4h = compute_panel(&h4.bars).unwrap_or_else(empty_panel);

        let change_1h_pct = entry
            .series
            .get(&Timeframe::H1)
            .map(|s| price_change_pct(&s.bars, now, ChronoDuration::hours(1), price))
            .unwrap_or(Decimal::ZERO);
        let change_4h_pct = price_change_pct(&h4.bars, now, ChronoDuration::hours(4), price);

        let oi = entry
            .oi_history
            .back()
            .copied()
            .unwrap_or(OiSnapshot {
                value: Decimal::ZERO,
                timestamp: now,
            });
        let (oi_change_4h_pct, oi_change_period_label) =
            change_4h(oi.value, entry.oi_history.iter().copied().collect::<Vec<_>>().as_slice(), now);

        Ok(MarketData {
            symbol: symbol.clone(),
            price,
            change_1h_pct,
            change_4h_pct,
            panel_3m,
            panel_15m,
            panel_1h,
            panel_4h,
            oi,
            oi_change_4h_pct,
            oi_change_period_label,
            funding_rate: entry.funding_rate,
        })
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_panel() -> IndicatorPanel {
    IndicatorPanel {
        ema20: Decimal::ZERO,
        macd: Decimal::ZERO,
        macd_signal: Decimal::ZERO,
        rsi7: Decimal::ZERO,
    }
}

fn is_frozen_and_untraded(bars: &VecDeque<Kline>) -> bool {
    last_n_identical(bars) && last_n_zero_volume(bars)
}

fn is_frozen_but_traded(bars: &VecDeque<Kline>) -> bool {
    last_n_identical(bars) && !last_n_zero_volume(bars)
}

fn last_n_identical(bars: &VecDeque<Kline>) -> bool {
    if bars.len() < FROZEN_WINDOW {
        return false;
    }
    let tail: Vec<_> = bars.iter().rev().take(FROZEN_WINDOW).collect();
    let first_close = tail[0].close;
    tail.iter().all(|b| b.close == first_close)
}

fn last_n_zero_volume(bars: &VecDeque<Kline>) -> bool {
    bars.iter()
        .rev()
        .take(FROZEN_WINDOW)
        .all(|b| b.volume.is_zero())
}

/// Finds the bar whose open-time is closest to `now - window` and returns
/// the percentage change from its close to `latest`. Zero when the series
/// doesn't cover the window.
fn price_change_pct(
    bars: &VecDeque<Kline>,
    now: DateTime<Utc>,
    window: ChronoDuration,
    latest: Decimal,
) -> Decimal {
    let target_ms = (now - window).timestamp_millis();
    let Some(reference) = bars
        .iter()
        .min_by_key(|b| (b.open_time - target_ms).abs())
    else {
        return Decimal::ZERO;
    };
    if reference.close.is_zero() {
        return Decimal::ZERO;
    }
    (latest - reference.close) / reference.close * Decimal::from(100)
}

/// Implements the OI change-4h rule from §4.A, including its degraded-history
/// cases. `history` is ordered oldest-first.
pub fn change_4h(v: Decimal, history: &[OiSnapshot], now: DateTime<Utc>) -> (Decimal, String) {
    if history.len() <= 1 {
        return (Decimal::ZERO, "0m".to_string());
    }

    let target = now - ChronoDuration::hours(4);
    let closest = history
        .iter()
        .min_by_key(|s| (s.timestamp - target).num_seconds().abs())
        .expect("non-empty checked above");

    let (baseline_sample, label) = if (closest.timestamp - target).num_seconds().abs() <= 3600 {
        (*closest, "4h".to_string())
    } else {
        let oldest = history.first().expect("non-empty checked above");
        let span = now - oldest.timestamp;
        let label = span_label(span);
        (*oldest, label)
    };

    if baseline_sample.value.is_zero() {
        return (Decimal::ZERO, "N/A".to_string());
    }

    let change = (v - baseline_sample.value) / baseline_sample.value * Decimal::from(100);
    (change, label)
}

fn span_label(span: ChronoDuration) -> String {
    let minutes = span.num_minutes();
    if minutes >= 60 {
        format!("{:.1}h", minutes as f64 / 60.0)
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal, volume: Decimal, open_time: i64) -> Kline {
        Kline {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            quote_volume: volume,
            trade_count: if volume.is_zero() { 0 } else { 1 },
            close_time: open_time + 1,
        }
    }

    #[tokio::test]
    async fn snapshot_refuses_unknown_symbol() {
        let cache = MarketCache::new();
        let err = cache
            .snapshot(&Symbol::normalize("doge"), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, MarketDataError::Unknown("DOGEUSDT".into()));
    }

    #[tokio::test]
    async fn snapshot_refuses_frozen_untraded_price() {
        let cache = MarketCache::new();
        let symbol = Symbol::normalize("doge");
        for i in 0..6 {
            cache
                .upsert_bar(&symbol, Timeframe::M3, bar(dec!(0.12345), Decimal::ZERO, i), 100)
                .await;
        }
        cache
            .upsert_bar(&symbol, Timeframe::H4, bar(dec!(0.12345), dec!(1), 0), 100)
            .await;
        let err = cache.snapshot(&symbol, Utc::now()).await.unwrap_err();
        assert_eq!(err, MarketDataError::StaleData);
    }

    #[tokio::test]
    async fn snapshot_allows_frozen_but_traded_price() {
        let cache = MarketCache::new();
        let symbol = Symbol::normalize("doge");
        let volumes = [dec!(1000), dec!(1200), dec!(900), dec!(1100), dec!(950)];
        for (i, v) in volumes.into_iter().enumerate() {
            cache
                .upsert_bar(&symbol, Timeframe::M3, bar(dec!(100.0), v, i as i64), 100)
                .await;
        }
        cache
            .upsert_bar(&symbol, Timeframe::H4, bar(dec!(100.0), dec!(1), 0), 100)
            .await;
        let data = cache.snapshot(&symbol, Utc::now()).await.unwrap();
        assert_eq!(data.price, dec!(100.0));
    }

    #[tokio::test]
    async fn snapshot_requires_h4_bars() {
        let cache = MarketCache::new();
        let symbol = Symbol::normalize("doge");
        cache
            .upsert_bar(&symbol, Timeframe::M3, bar(dec!(1), dec!(1), 0), 100)
            .await;
        let err = cache.snapshot(&symbol, Utc::now()).await.unwrap_err();
        assert_eq!(err, MarketDataError::MissingH4);
    }

    #[test]
    fn change_4h_degrades_with_two_samples() {
        let now = Utc::now();
        let history = vec![
            OiSnapshot {
                value: dec!(10_000),
                timestamp: now - ChronoDuration::hours(1),
            },
            OiSnapshot {
                value: dec!(10_500),
                timestamp: now,
            },
        ];
        let (change, label) = change_4h(dec!(10_500), &history, now);
        assert_eq!(change, dec!(5.0));
        assert_eq!(label, "1.0h");
    }

    #[test]
    fn change_4h_with_single_sample_is_zero() {
        let now = Utc::now();
        let history = vec![OiSnapshot {
            value: dec!(10_000),
            timestamp: now,
        }];
        let (change, label) = change_4h(dec!(10_000), &history, now);
        assert_eq!(change, Decimal::ZERO);
        assert_eq!(label, "0m");
    }
}
