use core_types::{IndicatorPanel, Kline};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
};
use ta::Next;

const EMA_PERIOD: usize = 20;
const RSI_PERIOD: usize = 7;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Runs the closed-bar series through EMA(20)/MACD(12,26,9)/RSI(7), seeded
/// from the full history so the reported values reflect the usual warm-up
/// smoothing rather than a cold start on every call.
pub fn compute_panel(bars: &VecDeque<Kline>) -> Option<IndicatorPanel> {
    if bars.is_empty() {
        return None;
    }

    let mut ema = ExponentialMovingAverage::new(EMA_PERIOD).expect("static period");
    let mut macd =
        MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
            .expect("static periods");
    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("static period");

    let mut ema_val = 0.0;
    let mut macd_val = 0.0;
    let mut macd_signal_val = 0.0;
    let mut rsi_val = 0.0;

    for bar in bars {
        let close = bar.close.to_f64().unwrap_or(0.0);
        ema_val = ema.next(close);
        let macd_out = macd.next(close);
        macd_val = macd_out.macd;
        macd_signal_val = macd_out.signal;
        rsi_val = rsi.next(close);
    }

    Some(IndicatorPanel {
        ema20: Decimal::from_f64_retain(ema_val).unwrap_or_default(),
        macd: Decimal::from_f64_retain(macd_val).unwrap_or_default(),
        macd_signal: Decimal::from_f64_retain(macd_signal_val).unwrap_or_default(),
        rsi7: Decimal::from_f64_retain(rsi_val).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal, open_time: i64) -> Kline {
        Kline {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            quote_volume: dec!(1),
            trade_count: 1,
            close_time: open_time + 1,
        }
    }

    #[test]
    fn empty_series_has_no_panel() {
        assert!(compute_panel(&VecDeque::new()).is_none());
    }

    #[test]
    fn panel_tracks_rising_closes() {
        let mut bars = VecDeque::new();
        let mut price = dec!(100);
        for i in 0..30 {
            bars.push_back(bar(price, i));
            price += dec!(1);
        }
        let panel = compute_panel(&bars).unwrap();
        assert!(panel.ema20 > dec!(100));
        assert!(panel.rsi7 > dec!(50));
        let _ = Utc::now();
    }
}
