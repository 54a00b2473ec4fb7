pub mod cache;
pub mod error;
pub mod indicators;
pub mod rest;
mod retry;
pub mod sampler;
pub mod stream;

use chrono::Utc;
use core_types::{KlineSeries, MarketData, Symbol, Timeframe};
pub use error::{Error, Result};
use rest::PublicMarketClient;
use retry::retry_with_backoff;
use std::sync::Arc;
use std::time::Duration;
use stream::StreamSession;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const BACKFILL_ATTEMPTS: u32 = 3;
const BACKFILL_BASE_DELAY: Duration = Duration::from_millis(500);
const BACKFILL_LIMIT: u16 = 200;
const OI_HISTORY_POINTS: u16 = 20;

/// The process-wide market data service (§4.A). Singleton: one instance is
/// shared by every trader's loop, regardless of which exchange account it
/// trades with, since klines/OI/funding are public data.
pub struct MarketFeeder {
    cache: Arc<cache::MarketCache>,
    rest: PublicMarketClient,
    stream: Arc<StreamSession>,
    sampler_shutdown_tx: watch::Sender<bool>,
    stream_shutdown_tx: watch::Sender<bool>,
    sampler_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    stream_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MarketFeeder {
    pub fn new(rest_base_url: impl Into<String>, ws_base_url: impl Into<String>) -> Self {
        let cache = Arc::new(cache::MarketCache::new());
        let rest = PublicMarketClient::new(rest_base_url);
        let stream = Arc::new(StreamSession::new(ws_base_url, cache.clone()));
        let (sampler_shutdown_tx, _) = watch::channel(false);
        let (stream_shutdown_tx, _) = watch::channel(false);
        Self {
            cache,
            rest,
            stream,
            sampler_shutdown_tx,
            stream_shutdown_tx,
            sampler_handle: std::sync::Mutex::new(None),
            stream_handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawns the streaming session and the OI sampler. Call once after
    /// construction. The two run under independent shutdown signals so
    /// `shutdown` can stop them in order (§5 "sampler stops first").
    pub fn spawn_background_tasks(&self) {
        let stream = self.stream.clone();
        let stream_shutdown = self.stream_shutdown_tx.subscribe();
        let stream_handle = tokio::spawn(async move {
            stream.run(stream_shutdown).await;
        });

        let sampler_rest = self.rest.clone();
        let sampler_cache = self.cache.clone();
        let sampler_shutdown = self.sampler_shutdown_tx.subscribe();
        let sampler_handle = tokio::spawn(async move {
            sampler::run(sampler_rest, sampler_cache, sampler_shutdown).await;
        });

        *self.stream_handle.lock().expect("stream handle mutex poisoned") = Some(stream_handle);
        *self.sampler_handle.lock().expect("sampler handle mutex poisoned") = Some(sampler_handle);
    }

    /// Produces a `MarketData` snapshot for `symbol`, or a refusal per §4.A.
    pub async fn snapshot(&self, symbol: &Symbol) -> Result<MarketData> {
        self.cache
            .snapshot(symbol, Utc::now())
            .await
            .map_err(Into::into)
    }

    /// Ensures series exist for every symbol in `universe`: backfills each
    /// timeframe (retry x3 uniformly, per-symbol failures degrade rather
    /// than aborting the batch) and the OI history, then subscribes the
    /// streaming session to the full (symbol, timeframe) product.
    pub async fn initialize(&self, universe: &[Symbol]) {
        for symbol in universe {
            for timeframe in Timeframe::all() {
                if let Err(err) = self.backfill_timeframe(symbol, timeframe).await {
                    tracing::warn!(
                        symbol = %symbol.0,
                        ?timeframe,
                        error = %err,
                        "timeframe backfill failed after retries, continuing with degraded data"
                    );
                }
            }
            self.backfill_oi_history(symbol).await;
        }

        let pairs: Vec<_> = universe
            .iter()
            .flat_map(|s| Timeframe::all().into_iter().map(move |tf| (s.clone(), tf)))
            .collect();
        self.stream.subscribe_many(pairs).await;
    }

    /// Idempotent single (symbol, timeframe) subscription, for symbols added
    /// to a trader's universe after startup.
    pub async fn subscribe(&self, symbol: Symbol, timeframe: Timeframe) {
        self.stream.subscribe(symbol, timeframe).await;
    }

    async fn backfill_timeframe(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<()> {
        let bars = retry_with_backoff(BACKFILL_ATTEMPTS, BACKFILL_BASE_DELAY, || {
            self.rest.fetch_klines(symbol, timeframe, BACKFILL_LIMIT)
        })
        .await?;

        for bar in bars {
            self.cache
                .upsert_bar(symbol, timeframe, bar, KlineSeries::MIN_RETAINED)
                .await;
        }
        Ok(())
    }

    async fn backfill_oi_history(&self, symbol: &Symbol) {
        let history = retry_with_backoff(BACKFILL_ATTEMPTS, BACKFILL_BASE_DELAY, || {
            self.rest.fetch_open_interest_history(symbol, OI_HISTORY_POINTS)
        })
        .await
        .unwrap_or_default();

        if history.is_empty() {
            if let Ok(value) = self.rest.fetch_open_interest(symbol).await {
                self.cache
                    .push_oi(
                        symbol,
                        core_types::OiSnapshot {
                            value,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }
            return;
        }

        for sample in history {
            self.cache.push_oi(symbol, sample).await;
        }
    }

    /// Stops the sampler first and awaits its termination, then stops the
    /// streaming session and awaits it (§5 "on process shutdown, the sampler
    /// stops first").
    pub async fn shutdown(&self) {
        let _ = self.sampler_shutdown_tx.send(true);
        let sampler_handle = self.sampler_handle.lock().expect("sampler handle mutex poisoned").take();
        if let Some(handle) = sampler_handle {
            let _ = handle.await;
        }

        let _ = self.stream_shutdown_tx.send(true);
        let stream_handle = self.stream_handle.lock().expect("stream handle mutex poisoned").take();
        if let Some(handle) = stream_handle {
            let _ = handle.await;
        }
    }
}
