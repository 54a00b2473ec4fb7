pub mod cex;
pub mod perp_dex;

use crate::types::OrderReceipt;
use crate::Result;
use async_trait::async_trait;
use core_types::{AccountSnapshot, MarginMode, Side, Symbol};
use rust_decimal::Decimal;

pub use cex::CexAdapter;
pub use perp_dex::PerpDexAdapter;

/// Uniform account and order surface over a venue (§4.B). Two concrete
/// variants exist: [`CexAdapter`] (HMAC-signed REST) and [`PerpDexAdapter`]
/// (wallet-signed REST). Instances are per trader since they carry venue
/// credentials, unlike the singleton market feeder.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Equity, available margin, used margin, per-symbol positions.
    /// Monotonic within a cycle, not guaranteed across cycles.
    async fn account(&self) -> Result<AccountSnapshot>;

    /// Idempotent: a no-op if the symbol is already at this leverage/mode.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u8, mode: MarginMode) -> Result<()>;

    /// Places a market order sized in quote currency. The adapter converts
    /// to base quantity using cached precision rules and rejects locally
    /// below the venue minimum, never round-tripping an order the venue
    /// would reject anyway.
    async fn open(
        &self,
        symbol: &Symbol,
        side: Side,
        notional_quote: Decimal,
        leverage: u8,
    ) -> Result<OrderReceipt>;

    /// Fully closes the open position for `symbol` (reduce-only).
    async fn close(&self, symbol: &Symbol) -> Result<OrderReceipt>;

    /// Attaches stop-loss/take-profit orders to the current position.
    /// Returns `Unsupported` rather than erroring the cycle when the venue
    /// has no bracket-order primitive.
    async fn attach_bracket(
        &self,
        symbol: &Symbol,
        stop_price: Option<Decimal>,
        take_price: Option<Decimal>,
    ) -> Result<Option<OrderReceipt>>;
}
