//! The Decision Engine (§4.D): a deterministic, stateless-per-cycle pipeline
//! rather than a single polymorphic strategy call — `parse_intents`,
//! `validate_intents`, `resolve_actions` run in sequence, each a free
//! function over plain data.

pub mod error;
pub mod history;
pub mod parse;
pub mod resolve;
pub mod validate;

pub use error::{Error, Result};
pub use history::{summarize, HistorySummary, SymbolRecord};
pub use parse::parse_intents;
pub use resolve::resolve_actions;
pub use validate::{validate_intents, IntentVerdict, ValidatedIntent};

use std::collections::HashMap;

use core_types::{AccountSnapshot, Decision, MarketData, Symbol, TraderConfig};

/// Runs the full Decision Engine pipeline over one cycle's AI response:
/// parse → validate → resolve. A parse failure is surfaced to the caller
/// (the Trader Loop logs the cycle as skipped per §4.D step 1) rather than
/// folded into an empty decision list, so the two "nothing happened"
/// outcomes stay distinguishable in the decision log.
pub fn evaluate(
    ai_text: &str,
    universe: &[Symbol],
    market: &HashMap<Symbol, MarketData>,
    account: &AccountSnapshot,
    config: &TraderConfig,
) -> Result<Vec<Decision>> {
    let intents = parse_intents(ai_text)?;
    let validated = validate_intents(intents, universe, market, account, config);
    Ok(resolve_actions(validated, account, config))
}
