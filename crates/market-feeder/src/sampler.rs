use crate::cache::MarketCache;
use crate::retry::retry_with_backoff;
use crate::rest::PublicMarketClient;
use chrono::Utc;
use core_types::OiSnapshot;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_IN_FLIGHT: usize = 10;

/// Samples open interest for every tracked symbol on a fixed cadence, with
/// bounded fan-out. Stops as soon as `shutdown` fires, ahead of everything
/// else in the feeder (§4.A "on process shutdown, the sampler stops first").
pub async fn run(
    rest: PublicMarketClient,
    cache: Arc<MarketCache>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SAMPLE_INTERVAL) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let symbols = cache.tracked_symbols().await;
        let rest = &rest;
        let cache = &cache;
        stream::iter(symbols)
            .for_each_concurrent(MAX_IN_FLIGHT, |symbol| async move {
                let result = retry_with_backoff(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || {
                    rest.fetch_open_interest(&symbol)
                })
                .await;
                match result {
                    Ok(value) => {
                        cache
                            .push_oi(
                                &symbol,
                                OiSnapshot {
                                    value,
                                    timestamp: Utc::now(),
                                },
                            )
                            .await;
                    }
                    Err(err) => {
                        tracing::warn!(symbol = %symbol.0, error = %err, "open interest sample failed after retries");
                    }
                }
            })
            .await;
    }
}
