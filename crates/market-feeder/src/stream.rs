use crate::cache::MarketCache;
use core_types::{Kline, Symbol, Timeframe};
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::connect_async;

/// Hard ceiling on multiplexed `symbol x timeframe` streams in a single
/// session (250 symbols x 4 timeframes = 1000 is the expected safe
/// operating point).
pub const SESSION_BOUND: usize = 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: rust_decimal::Decimal,
    #[serde(rename = "c")]
    close: rust_decimal::Decimal,
    #[serde(rename = "h")]
    high: rust_decimal::Decimal,
    #[serde(rename = "l")]
    low: rust_decimal::Decimal,
    #[serde(rename = "v")]
    volume: rust_decimal::Decimal,
    #[serde(rename = "q")]
    quote_volume: rust_decimal::Decimal,
    #[serde(rename = "n")]
    trade_count: u64,
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

/// The multiplexed streaming session for all tracked (symbol, timeframe)
/// pairs. One session per feeder, reconnecting with backoff; reconnecting
/// rebuilds the stream list from the live subscription set but never
/// touches the cache's retained bars.
pub struct StreamSession {
    ws_base_url: String,
    cache: Arc<MarketCache>,
    subscriptions: Mutex<HashSet<(Symbol, Timeframe)>>,
    resubscribe: Notify,
}

impl StreamSession {
    pub fn new(ws_base_url: impl Into<String>, cache: Arc<MarketCache>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            cache,
            subscriptions: Mutex::new(HashSet::new()),
            resubscribe: Notify::new(),
        }
    }

    /// Idempotent single-pair subscription. Silently refuses once the
    /// session is at [`SESSION_BOUND`].
    pub async fn subscribe(&self, symbol: Symbol, timeframe: Timeframe) {
        let mut subs = self.subscriptions.lock().await;
        if subs.contains(&(symbol.clone(), timeframe)) {
            return;
        }
        if subs.len() >= SESSION_BOUND {
            tracing::warn!(symbol = %symbol.0, ?timeframe, "streaming session at capacity, refusing subscription");
            return;
        }
        subs.insert((symbol, timeframe));
        drop(subs);
        self.resubscribe.notify_one();
    }

    /// Bulk subscription used by `initialize`. Truncates to [`SESSION_BOUND`]
    /// and logs when the requested universe exceeds it.
    pub async fn subscribe_many(&self, pairs: Vec<(Symbol, Timeframe)>) {
        let mut subs = self.subscriptions.lock().await;
        let mut truncated = false;
        for pair in pairs {
            if subs.len() >= SESSION_BOUND {
                truncated = true;
                break;
            }
            subs.insert(pair);
        }
        drop(subs);
        if truncated {
            tracing::warn!(
                bound = SESSION_BOUND,
                "requested universe exceeds the streaming session bound; truncated to the first entries"
            );
        }
        self.resubscribe.notify_one();
    }

    /// Runs the reconnect loop until `shutdown` fires. Intended to be
    /// `tokio::spawn`ed once by the feeder.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let streams = self.stream_names().await;
            if streams.is_empty() {
                tokio::select! {
                    _ = self.resubscribe.notified() => continue,
                    _ = shutdown.changed() => return,
                }
            }

            let url = format!(
                "{}/stream?streams={}",
                self.ws_base_url,
                streams.join("/")
            );

            tracing::info!(pairs = streams.len(), "connecting market data stream");
            let ws_stream = tokio::select! {
                res = connect_async(&url) => res,
                _ = shutdown.changed() => return,
            };

            let (ws_stream, _) = match ws_stream {
                Ok(s) => s,
                Err(err) => {
                    tracing::error!(error = %err, "market data stream connection failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                        _ = shutdown.changed() => return,
                    }
                }
            };

            let mut read = ws_stream.fuse();
            loop {
                tokio::select! {
                    message = read.next() => {
                        match message {
                            Some(Ok(msg)) => self.handle_message(msg).await,
                            Some(Err(err)) => {
                                tracing::warn!(error = %err, "market data stream read error, reconnecting");
                                break;
                            }
                            None => {
                                tracing::warn!("market data stream closed, reconnecting");
                                break;
                            }
                        }
                    }
                    _ = self.resubscribe.notified() => break,
                    _ = shutdown.changed() => return,
                }
            }
        }
    }

    async fn handle_message(&self, msg: tokio_tungstenite::tungstenite::Message) {
        let Ok(text) = msg.to_text() else { return };
        let Ok(mut wrapper) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };
        let Some(data) = wrapper.get_mut("data") else {
            return;
        };
        let Ok(event) = serde_json::from_value::<WsKlineEvent>(data.take()) else {
            return;
        };

        let symbol = Symbol::normalize(&event.symbol);
        let Some(timeframe) = Timeframe::from_binance_interval(&event.kline.interval) else {
            return;
        };

        let bar = Kline {
            open_time: event.kline.open_time,
            open: event.kline.open,
            high: event.kline.high,
            low: event.kline.low,
            close: event.kline.close,
            volume: event.kline.volume,
            quote_volume: event.kline.quote_volume,
            trade_count: event.kline.trade_count,
            close_time: event.kline.close_time,
        };
        self.cache
            .upsert_bar(&symbol, timeframe, bar, core_types::KlineSeries::MIN_RETAINED)
            .await;
    }

    async fn stream_names(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .await
            .iter()
            .map(|(symbol, tf)| {
                format!("{}@kline_{}", symbol.0.to_lowercase(), tf.as_binance_interval())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let session = StreamSession::new("wss://example", Arc::new(MarketCache::new()));
        let symbol = Symbol::normalize("btc");
        session.subscribe(symbol.clone(), Timeframe::M3).await;
        session.subscribe(symbol.clone(), Timeframe::M3).await;
        assert_eq!(session.subscriptions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_many_truncates_to_bound() {
        let session = StreamSession::new("wss://example", Arc::new(MarketCache::new()));
        let pairs: Vec<_> = (0..SESSION_BOUND + 50)
            .map(|i| (Symbol::normalize(&format!("sym{i}")), Timeframe::M3))
            .collect();
        session.subscribe_many(pairs).await;
        assert_eq!(session.subscriptions.lock().await.len(), SESSION_BOUND);
    }
}
