use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, Decision, Intent, MarketDataDigest, Symbol};
use events::CycleStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One append-only row of the decision log (§4.G): everything needed to
/// reconstruct why a cycle did what it did without replaying the full
/// multi-timeframe market data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: Uuid,
    pub trader_id: String,
    pub cycle_index: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub universe: Vec<Symbol>,
    pub account_before: AccountSnapshot,
    pub account_after: AccountSnapshot,
    pub market_digests: Vec<MarketDataDigest>,
    pub ai_raw_text: String,
    pub intents: Vec<Intent>,
    pub decisions: Vec<Decision>,
    pub order_outcomes: Vec<OrderOutcome>,
    pub status: CycleStatus,
}

impl CycleRecord {
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// The terminal outcome of one `Decision` executed against the exchange
/// adapter during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub symbol: Symbol,
    pub kind: OrderOutcomeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderOutcomeKind {
    Filled {
        venue_order_id: String,
        avg_price: Decimal,
        filled_qty: Decimal,
    },
    Rejected {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}
