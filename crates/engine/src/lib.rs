//! The Trader Loop and Manager (§4.E, §4.F): per-trader decision cycles and
//! the process-level registry that starts, stops, and reads them.

pub mod adapter_factory;
pub mod error;
pub mod manager;
pub mod prompt;
pub mod trader;

pub use error::{Error, Result};
pub use manager::{CompetitionEntry, Manager, TraderView};
pub use trader::{Trader, TraderRuntime};
