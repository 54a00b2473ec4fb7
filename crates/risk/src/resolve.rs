//! Step 3 of the Decision Engine (§4.D): turns validated intents into the
//! ordered list of `Decision`s the Trader Loop executes against the
//! Exchange Adapter.

use core_types::{AccountSnapshot, Decision, DecisionOp, Intent, IntentAction, TraderConfig};
use rust_decimal::prelude::*;

use crate::validate::ValidatedIntent;

/// Resolution priority per symbol (§4.D step 3):
/// 1. OPEN against an opposite-side position → CLOSE then OPEN (flip).
/// 2. OPEN against a same-side position → NOOP `duplicate` (already filtered
///    out by `validate_intents`, kept here as a defensive fallback).
/// 3. OPEN with no existing position → OPEN.
/// 4. CLOSE against an existing position → CLOSE; otherwise NOOP.
/// 5. HOLD → NOOP.
pub fn resolve_actions(
    validated: Vec<ValidatedIntent>,
    account: &AccountSnapshot,
    config: &TraderConfig,
) -> Vec<Decision> {
    let mut decisions = Vec::with_capacity(validated.len());

    for item in validated {
        let intent = match item.verdict {
            super::validate::IntentVerdict::Accepted(intent) => intent,
            super::validate::IntentVerdict::Rejected(reason) => {
                decisions.push(Decision {
                    symbol: item.symbol,
                    op: DecisionOp::Noop { reason },
                });
                continue;
            }
        };

        let existing = account.positions.get(&item.symbol);

        match intent.action {
            IntentAction::Open => {
                let side = intent.side.expect("validated OPEN carries a side");
                match existing {
                    Some(position) if position.side != side => {
                        decisions.push(Decision {
                            symbol: item.symbol.clone(),
                            op: DecisionOp::Close,
                        });
                        decisions.push(Decision {
                            symbol: item.symbol,
                            op: open_op(&intent, config, account.total_equity),
                        });
                    }
                    Some(_) => {
                        decisions.push(Decision {
                            symbol: item.symbol,
                            op: DecisionOp::Noop {
                                reason: "duplicate".to_string(),
                            },
                        });
                    }
                    None => {
                        decisions.push(Decision {
                            symbol: item.symbol,
                            op: open_op(&intent, config, account.total_equity),
                        });
                    }
                }
            }
            IntentAction::Close => {
                let op = if existing.is_some() {
                    DecisionOp::Close
                } else {
                    DecisionOp::Noop {
                        reason: "no-position".to_string(),
                    }
                };
                decisions.push(Decision {
                    symbol: item.symbol,
                    op,
                });
            }
            IntentAction::Hold => {
                decisions.push(Decision {
                    symbol: item.symbol,
                    op: DecisionOp::Noop {
                        reason: "hold".to_string(),
                    },
                });
            }
        }
    }

    decisions
}

fn open_op(intent: &Intent, config: &TraderConfig, equity: Decimal) -> DecisionOp {
    let symbol = core_types::Symbol::normalize(&intent.symbol);
    let leverage = config.leverage_for(&symbol);
    let side = intent.side.expect("validated OPEN carries a side");
    let size_fraction = intent.size_fraction.expect("validated OPEN carries a size");
    let size_fraction = Decimal::from_f64(size_fraction).unwrap_or(Decimal::ZERO);

    // Notional was already bounds-checked in `validate_open`; recomputed here
    // from the same inputs rather than threaded through as extra state.
    let notional = size_fraction * Decimal::from(leverage) * equity;

    let stop_loss = intent.stop_loss;
    let take_profit = intent.take_profit;

    match side {
        core_types::Side::Long => DecisionOp::OpenLong {
            notional,
            leverage,
            stop_loss,
            take_profit,
        },
        core_types::Side::Short => DecisionOp::OpenShort {
            notional,
            leverage,
            stop_loss,
            take_profit,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::IntentVerdict;
    use core_types::{MarginMode, Position, Side, Symbol, SymbolUniversePolicy};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
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

    #[test]
    fn flip_emits_close_then_open() {
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
        let intent = Intent {
            symbol: "ETHUSDT".to_string(),
            action: IntentAction::Open,
            side: Some(Side::Short),
            size_fraction: Some(0.2),
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        };
        let validated = vec![ValidatedIntent {
            symbol: Symbol::normalize("ETHUSDT"),
            verdict: IntentVerdict::Accepted(intent),
        }];

        let decisions = resolve_actions(validated, &account, &cfg);
        assert_eq!(decisions.len(), 2);
        assert!(matches!(decisions[0].op, DecisionOp::Close));
        match &decisions[1].op {
            DecisionOp::OpenShort { notional, .. } => assert_eq!(*notional, dec!(20000)),
            other => panic!("expected OpenShort, got {other:?}"),
        }
    }

    #[test]
    fn close_without_position_is_noop() {
        let cfg = config();
        let account = AccountSnapshot::default();
        let intent = Intent {
            symbol: "BTCUSDT".to_string(),
            action: IntentAction::Close,
            side: None,
            size_fraction: None,
            stop_loss: None,
            take_profit: None,
            reason: String::new(),
        };
        let validated = vec![ValidatedIntent {
            symbol: Symbol::normalize("BTCUSDT"),
            verdict: IntentVerdict::Accepted(intent),
        }];

        let decisions = resolve_actions(validated, &account, &cfg);
        assert_eq!(decisions.len(), 1);
        assert!(matches!(&decisions[0].op, DecisionOp::Noop { reason } if reason == "no-position"));
    }

    #[test]
    fn rejected_intent_becomes_noop_with_its_reason() {
        let cfg = config();
        let account = AccountSnapshot::default();
        let validated = vec![ValidatedIntent {
            symbol: Symbol::normalize("SOLUSDT"),
            verdict: IntentVerdict::Rejected("alt-notional-cap".to_string()),
        }];

        let decisions = resolve_actions(validated, &account, &cfg);
        assert!(matches!(&decisions[0].op, DecisionOp::Noop { reason } if reason == "alt-notional-cap"));
    }
}
