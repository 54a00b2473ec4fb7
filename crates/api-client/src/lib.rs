//! Polymorphic exchange-adapter and AI-client surface (§4.B, §4.C). Both are
//! per-trader instances (never shared, since they carry credentials), built
//! as explicit strategy objects dispatched statically per trader
//! configuration rather than through a single generic HTTP client.

pub mod adapter;
pub mod ai;
pub mod error;
pub mod retry;
pub mod types;

pub use adapter::{CexAdapter, ExchangeAdapter, PerpDexAdapter};
pub use ai::AiClient;
pub use error::{Error, Result};
pub use types::{OrderReceipt, SymbolPrecision};
