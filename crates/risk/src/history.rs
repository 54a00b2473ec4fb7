//! History feedback (§4.D): before constructing the prompt, summarize the
//! trader's last N closed cycles — wins/losses per symbol, average P/L,
//! longest losing streak. Advisory text only; it never gates a decision.

use std::collections::HashMap;

use core_types::{Symbol, TradeOutcome};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default)]
pub struct SymbolRecord {
    pub wins: u32,
    pub losses: u32,
    pub total_pnl: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct HistorySummary {
    pub per_symbol: HashMap<Symbol, SymbolRecord>,
    pub total_trades: u32,
    pub average_pnl: Decimal,
    pub longest_losing_streak: u32,
}

impl HistorySummary {
    /// Renders the summary as the advisory text appended to the system
    /// prompt. Deterministic ordering (sorted by symbol) so prompts are
    /// reproducible for the same input.
    pub fn to_prompt_text(&self) -> String {
        if self.total_trades == 0 {
            return "No closed trades yet.".to_string();
        }

        let mut symbols: Vec<&Symbol> = self.per_symbol.keys().collect();
        symbols.sort_by(|a, b| a.0.cmp(&b.0));

        let mut lines = vec![format!(
            "Last {} closed trades: average P/L {}, longest losing streak {}.",
            self.total_trades, self.average_pnl, self.longest_losing_streak
        )];
        for symbol in symbols {
            let record = &self.per_symbol[symbol];
            lines.push(format!(
                "{}: {} wins, {} losses, total P/L {}.",
                symbol, record.wins, record.losses, record.total_pnl
            ));
        }
        lines.join("\n")
    }
}

/// Summarizes the trader's most recent closed cycles, newest-first, for the
/// §4.D prompt-composition step. `outcomes` should already be capped to the
/// last 20 by the caller (`database::recent_trade_outcomes`).
pub fn summarize(outcomes: &[TradeOutcome]) -> HistorySummary {
    let mut per_symbol: HashMap<Symbol, SymbolRecord> = HashMap::new();
    let mut total_pnl = Decimal::ZERO;
    let mut longest_losing_streak = 0u32;
    let mut current_losing_streak = 0u32;

    // Streaks read naturally oldest-to-newest; outcomes arrive newest-first.
    for outcome in outcomes.iter().rev() {
        let record = per_symbol.entry(outcome.symbol.clone()).or_default();
        if outcome.is_win() {
            record.wins += 1;
            current_losing_streak = 0;
        } else {
            record.losses += 1;
            current_losing_streak += 1;
            longest_losing_streak = longest_losing_streak.max(current_losing_streak);
        }
        record.total_pnl += outcome.realized_pnl;
        total_pnl += outcome.realized_pnl;
    }

    let total_trades = outcomes.len() as u32;
    let average_pnl = if total_trades == 0 {
        Decimal::ZERO
    } else {
        total_pnl / Decimal::from(total_trades)
    };

    HistorySummary {
        per_symbol,
        total_trades,
        average_pnl,
        longest_losing_streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn outcome(symbol: &str, pnl: Decimal) -> TradeOutcome {
        TradeOutcome {
            symbol: Symbol::normalize(symbol),
            realized_pnl: pnl,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_history_has_no_trades() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.to_prompt_text(), "No closed trades yet.");
    }

    #[test]
    fn tracks_longest_losing_streak_across_symbols() {
        // Newest-first input; chronologically BTC loss, ETH loss, BTC loss, BTC win.
        let outcomes = vec![
            outcome("BTCUSDT", dec!(50)),
            outcome("BTCUSDT", dec!(-10)),
            outcome("ETHUSDT", dec!(-5)),
            outcome("BTCUSDT", dec!(-20)),
        ];
        let summary = summarize(&outcomes);
        assert_eq!(summary.longest_losing_streak, 2);
        assert_eq!(summary.total_trades, 4);
    }

    #[test]
    fn average_pnl_divides_by_trade_count() {
        let outcomes = vec![outcome("BTCUSDT", dec!(100)), outcome("BTCUSDT", dec!(-50))];
        let summary = summarize(&outcomes);
        assert_eq!(summary.average_pnl, dec!(25));
    }
}
