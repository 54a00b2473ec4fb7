//! Resolves an opaque `ExchangeConfig` record into the concrete
//! `ExchangeAdapter` it names (§9 "Dynamic dispatch -> tagged variants").
//! Kept as its own module rather than a method on `Trader` since the
//! Manager also needs it at `start()` time, before a `Trader` exists.

use api_client::{CexAdapter, ExchangeAdapter, PerpDexAdapter, Result};
use app_config::types::{ExchangeConfig, Venue};

pub fn build(config: &ExchangeConfig) -> Result<Box<dyn ExchangeAdapter>> {
    match config.venue {
        Venue::CexLike => {
            let adapter = CexAdapter::new(config.rest_base_url.clone(), &config.auth)?;
            Ok(Box::new(adapter))
        }
        Venue::PerpDexA | Venue::PerpDexB => {
            let adapter = PerpDexAdapter::new(config.rest_base_url.clone(), &config.auth)?;
            Ok(Box::new(adapter))
        }
    }
}
