//! Step 2 of the Decision Engine (§4.D): per-intent validation. Each intent
//! is either accepted as-is or rejected with a specific, stable reason
//! string that ends up as the `Decision::Noop` reason in the log.

use std::collections::HashMap;

use core_types::{AccountSnapshot, Intent, IntentAction, MarketData, Symbol, TraderConfig};
use rust_decimal::prelude::*;

/// 10x equity for BTC/ETH, 1.5x equity for any other symbol (§4.D step 2).
pub const MAJOR_NOTIONAL_CAP_MULTIPLIER: i64 = 10;
pub const ALT_NOTIONAL_CAP_MULTIPLIER_TENTHS: i64 = 15;
/// Cumulative used margin may not exceed 90% of equity after any accepted intent.
pub const MARGIN_CAP_RATIO_HUNDREDTHS: i64 = 90;
/// Minimum acceptable risk-reward ratio for `OPEN` intents with both
/// stop-loss and take-profit supplied.
pub const MIN_RISK_REWARD: i64 = 2;

#[derive(Debug, Clone)]
pub enum IntentVerdict {
    Accepted(Intent),
    Rejected(String),
}

/// One intent paired with the symbol it resolved to (normalized) and its
/// validation outcome.
#[derive(Debug, Clone)]
pub struct ValidatedIntent {
    pub symbol: Symbol,
    pub verdict: IntentVerdict,
}

/// Validates each intent against the cycle's universe, market data,
/// account state, and trader config, in the order the AI produced them —
/// the cumulative margin check is greedy over this exact order (§4.D step 2).
pub fn validate_intents(
    intents: Vec<Intent>,
    universe: &[Symbol],
    market: &HashMap<Symbol, MarketData>,
    account: &AccountSnapshot,
    config: &TraderConfig,
) -> Vec<ValidatedIntent> {
    let margin_cap = account.total_equity * Decimal::new(MARGIN_CAP_RATIO_HUNDREDTHS, 2);
    let mut cumulative_used_margin = account.used_margin;
    let mut out = Vec::with_capacity(intents.len());

    for intent in intents {
        let symbol = Symbol::normalize(&intent.symbol);

        let verdict = if !universe.contains(&symbol) {
            IntentVerdict::Rejected("symbol-not-in-universe".to_string())
        } else if !market.contains_key(&symbol) {
            IntentVerdict::Rejected("market-data-unavailable".to_string())
        } else {
            match intent.action {
                IntentAction::Hold => IntentVerdict::Accepted(intent),
                IntentAction::Close => IntentVerdict::Accepted(intent),
                IntentAction::Open => validate_open(
                    &intent,
                    &symbol,
                    market.get(&symbol).expect("checked above"),
                    account,
                    config,
                    &margin_cap,
                    &mut cumulative_used_margin,
                ),
            }
        };

        out.push(ValidatedIntent { symbol, verdict });
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn validate_open(
    intent: &Intent,
    symbol: &Symbol,
    market_data: &MarketData,
    account: &AccountSnapshot,
    config: &TraderConfig,
    margin_cap: &Decimal,
    cumulative_used_margin: &mut Decimal,
) -> IntentVerdict {
    let (side, size_fraction) = match (intent.side, intent.size_fraction) {
        (Some(side), Some(frac)) if frac > 0.0 && frac <= 1.0 => (side, frac),
        _ => return IntentVerdict::Rejected("open-missing-side-or-size".to_string()),
    };

    if let (Some(stop_loss), Some(take_profit)) = (intent.stop_loss, intent.take_profit) {
        if !risk_reward_ok(market_data.price, side, stop_loss, take_profit) {
            return IntentVerdict::Rejected("rr<1:2".to_string());
        }
    }

    if let Some(existing) = account.positions.get(symbol) {
        if existing.side == side {
            return IntentVerdict::Rejected("duplicate".to_string());
        }
    }

    let leverage = config.leverage_for(symbol);
    let size_fraction_decimal = Decimal::from_f64(size_fraction).unwrap_or(Decimal::ZERO);
    let notional = size_fraction_decimal * Decimal::from(leverage) * account.total_equity;

    let cap_multiplier = if symbol.is_major() {
        Decimal::from(MAJOR_NOTIONAL_CAP_MULTIPLIER)
    } else {
        Decimal::new(ALT_NOTIONAL_CAP_MULTIPLIER_TENTHS, 1)
    };
    let cap = cap_multiplier * account.total_equity;
    if notional > cap {
        let reason = if symbol.is_major() {
            "major-notional-cap"
        } else {
            "alt-notional-cap"
        };
        return IntentVerdict::Rejected(reason.to_string());
    }

    let required_margin = if leverage == 0 {
        notional
    } else {
        notional / Decimal::from(leverage)
    };
    let projected = *cumulative_used_margin + required_margin;
    if projected > *margin_cap {
        return IntentVerdict::Rejected("margin-cap".to_string());
    }
    *cumulative_used_margin = projected;

    IntentVerdict::Accepted(intent.clone())
}

/// Risk-reward against the intended entry, direction-aware: a long's stop
/// sits below entry and its target above; a short is the mirror image.
/// Ratio is reward (distance to target) over risk (distance to stop).
fn risk_reward_ok(
    entry: Decimal,
    side: core_types::Side,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> bool {
    let (risk, reward) = match side {
        core_types::Side::Long => (entry - stop_loss, take_profit - entry),
        core_types::Side::Short => (stop_loss - entry, entry - take_profit),
    };
    if risk <= Decimal::ZERO || reward <= Decimal::ZERO {
        return false;
    }
    reward >= Decimal::from(MIN_RISK_REWARD) * risk
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MarginMode, Position, Side, SymbolUniversePolicy};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config() -> TraderConfig {
        TraderConfig {
            id: "t1".to_string(),
            owner_id: "u1".to_string(),
            ai_ref: "m1".to_string(),
            exchange_ref: "e1".to_string(),
            initial_balance: dec!(10000),
            scan_interval: Duration::from_secs(180),
            btc_eth_leverage: 10,
            altcoin_leverage: 5,
            margin_mode: MarginMode::Cross,
            prompt_template_ref: "default".to_string(),
            custom_prompt: None,
            symbol_universe: SymbolUniversePolicy {
                custom_symbols: vec![],
                include_default_pool: true,
            },
        }
    }

    fn market_data(symbol: &str, price: Decimal) -> MarketData {
        let panel = core_types::IndicatorPanel {
            ema20: price,
            macd: Decimal::ZERO,
            macd_signal: Decimal::ZERO,
            rsi7: dec!(50),
        };
        MarketData {
            symbol: Symbol::normalize(symbol),
            price,
            change_1h_pct: Decimal::ZERO,
            change_4h_pct: Decimal::ZERO,
            panel_3m: panel.clone(),
            panel_15m: panel.clone(),
            panel_1h: panel.clone(),
            panel_4h: panel,
            oi: core_types::OiSnapshot {
                value: Decimal::ZERO,
                timestamp: chrono::Utc::now(),
            },
            oi_change_4h_pct: Decimal::ZERO,
            oi_change_period_label: "4.0h".to_string(),
            funding_rate: Decimal::ZERO,
        }
    }

    fn open_intent(symbol: &str, side: Side, size_fraction: f64) -> Intent {
        Intent {
            symbol: symbol.to_string(),
            action: IntentAction::Open,
            side: Some(side),
            size_fraction: Some(size_fraction),
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        }
    }

    #[test]
    fn flip_is_not_a_duplicate() {
        let cfg = config();
        let mut account = AccountSnapshot {
            available_margin: dec!(5000),
            total_equity: dec!(10000),
            used_margin: dec!(0),
            positions: HashMap::new(),
        };
        account.positions.insert(
            Symbol::normalize("ETHUSDT"),
            Position {
                symbol: Symbol::normalize("ETHUSDT"),
                side: Side::Long,
                qty: dec!(1),
                entry_price: dec!(3000),
                leverage: 10,
                unrealized_pnl: Decimal::ZERO,
            },
        );
        let mut market = HashMap::new();
        market.insert(Symbol::normalize("ETHUSDT"), market_data("ETHUSDT", dec!(3000)));
        let universe = vec![Symbol::normalize("ETHUSDT")];
        let intents = vec![open_intent("ETHUSDT", Side::Short, 0.2)];

        let verdicts = validate_intents(intents, &universe, &market, &account, &cfg);
        assert_eq!(verdicts.len(), 1);
        assert!(matches!(verdicts[0].verdict, IntentVerdict::Accepted(_)));
    }

    #[test]
    fn same_side_open_is_rejected_as_duplicate() {
        let cfg = config();
        let mut account = AccountSnapshot {
            available_margin: dec!(5000),
            total_equity: dec!(10000),
            used_margin: dec!(0),
            positions: HashMap::new(),
        };
        account.positions.insert(
            Symbol::normalize("ETHUSDT"),
            Position {
                symbol: Symbol::normalize("ETHUSDT"),
                side: Side::Long,
                qty: dec!(1),
                entry_price: dec!(3000),
                leverage: 10,
                unrealized_pnl: Decimal::ZERO,
            },
        );
        let mut market = HashMap::new();
        market.insert(Symbol::normalize("ETHUSDT"), market_data("ETHUSDT", dec!(3000)));
        let universe = vec![Symbol::normalize("ETHUSDT")];
        let intents = vec![open_intent("ETHUSDT", Side::Long, 0.2)];

        let verdicts = validate_intents(intents, &universe, &market, &account, &cfg);
        assert!(matches!(
            verdicts[0].verdict,
            IntentVerdict::Rejected(ref r) if r == "duplicate"
        ));
    }

    #[test]
    fn alt_notional_cap_is_enforced() {
        let cfg = config();
        let account = AccountSnapshot {
            available_margin: dec!(1000),
            total_equity: dec!(1000),
            used_margin: dec!(0),
            positions: HashMap::new(),
        };
        let mut market = HashMap::new();
        market.insert(Symbol::normalize("SOLUSDT"), market_data("SOLUSDT", dec!(150)));
        let universe = vec![Symbol::normalize("SOLUSDT")];
        let intents = vec![open_intent("SOLUSDT", Side::Long, 1.0)];

        let verdicts = validate_intents(intents, &universe, &market, &account, &cfg);
        assert!(matches!(
            verdicts[0].verdict,
            IntentVerdict::Rejected(ref r) if r == "alt-notional-cap"
        ));
    }

    #[test]
    fn risk_reward_below_threshold_is_rejected() {
        let cfg = config();
        let account = AccountSnapshot {
            available_margin: dec!(10000),
            total_equity: dec!(10000),
            used_margin: dec!(0),
            positions: HashMap::new(),
        };
        let mut market = HashMap::new();
        market.insert(Symbol::normalize("ETHUSDT"), market_data("ETHUSDT", dec!(3000)));
        let universe = vec![Symbol::normalize("ETHUSDT")];
        let mut intent = open_intent("ETHUSDT", Side::Long, 0.1);
        intent.stop_loss = Some(dec!(2900));
        intent.take_profit = Some(dec!(3150));

        let verdicts = validate_intents(vec![intent], &universe, &market, &account, &cfg);
        assert!(matches!(
            verdicts[0].verdict,
            IntentVerdict::Rejected(ref r) if r == "rr<1:2"
        ));
    }

    #[test]
    fn cumulative_margin_cap_rejects_later_intents_greedily() {
        let cfg = config();
        let account = AccountSnapshot {
            available_margin: dec!(10000),
            total_equity: dec!(1000),
            used_margin: dec!(0),
            positions: HashMap::new(),
        };
        let mut market = HashMap::new();
        market.insert(Symbol::normalize("BTCUSDT"), market_data("BTCUSDT", dec!(60000)));
        market.insert(Symbol::normalize("ETHUSDT"), market_data("ETHUSDT", dec!(3000)));
        let universe = vec![Symbol::normalize("BTCUSDT"), Symbol::normalize("ETHUSDT")];
        let intents = vec![
            open_intent("BTCUSDT", Side::Long, 0.8),
            open_intent("ETHUSDT", Side::Long, 0.8),
        ];

        let verdicts = validate_intents(intents, &universe, &market, &account, &cfg);
        assert!(matches!(verdicts[0].verdict, IntentVerdict::Accepted(_)));
        assert!(matches!(
            verdicts[1].verdict,
            IntentVerdict::Rejected(ref r) if r == "margin-cap"
        ));
    }
}
