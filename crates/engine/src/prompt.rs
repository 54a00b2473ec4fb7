//! Prompt assembly (§4.E step 4): a system prompt built from the trader's
//! selected template plus the history summary, and a user prompt built from
//! the cycle's market snapshots and current positions. Templates are
//! referenced by id (`prompt_template_ref`) rather than embedded in
//! `TraderConfig`, the same opaque-by-id shape the config store already
//! uses for AI models and exchanges; only the one built-in default exists
//! today, with `custom_prompt` layered on top per trader.

use std::collections::HashMap;

use core_types::{AccountSnapshot, CustomPrompt, MarketData, Symbol};

const DEFAULT_TEMPLATE: &str = "\
You are an autonomous perpetual-futures trader. For every symbol below, \
decide OPEN, CLOSE, or HOLD. An OPEN must include a side, a size-fraction \
of equity in (0, 1], and a stop-loss/take-profit pair with at least a \
1:2 risk-reward. Respond with nothing but a JSON array of intents, one \
object per symbol, using the keys: symbol, action, side, size-fraction, \
stop-loss, take-profit, reason.";

pub fn render_template(_template_ref: &str, custom: Option<&CustomPrompt>) -> String {
    let body = DEFAULT_TEMPLATE.to_string();
    match custom {
        None => body,
        Some(CustomPrompt::Additive(extra)) => format!("{body}\n\n{extra}"),
        Some(CustomPrompt::Overriding(replacement)) => replacement.clone(),
    }
}

pub fn system_prompt(template_ref: &str, custom: Option<&CustomPrompt>, history_text: &str) -> String {
    format!("{}\n\nRecent performance:\n{}", render_template(template_ref, custom), history_text)
}

pub fn user_prompt(market: &HashMap<Symbol, MarketData>, account: &AccountSnapshot) -> String {
    let mut symbols: Vec<&Symbol> = market.keys().collect();
    symbols.sort_by(|a, b| a.0.cmp(&b.0));

    let market_json: Vec<&MarketData> = symbols.iter().map(|s| &market[*s]).collect();
    let market_text = serde_json::to_string(&market_json).unwrap_or_default();

    let mut positions: Vec<_> = account.positions.values().collect();
    positions.sort_by(|a, b| a.symbol.0.cmp(&b.symbol.0));
    let positions_text = serde_json::to_string(&positions).unwrap_or_default();

    format!(
        "Account equity: {}\nAvailable margin: {}\nOpen positions: {}\n\nMarket data: {}",
        account.total_equity, account.available_margin, positions_text, market_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_custom_prompt_appends_to_default() {
        let rendered = render_template("default", Some(&CustomPrompt::Additive("Be cautious.".into())));
        assert!(rendered.starts_with(DEFAULT_TEMPLATE));
        assert!(rendered.ends_with("Be cautious."));
    }

    #[test]
    fn overriding_custom_prompt_replaces_default() {
        let rendered = render_template("default", Some(&CustomPrompt::Overriding("Only trade BTC.".into())));
        assert_eq!(rendered, "Only trade BTC.");
    }

    #[test]
    fn no_custom_prompt_uses_template_verbatim() {
        assert_eq!(render_template("default", None), DEFAULT_TEMPLATE);
    }
}
