//! The Manager (§4.F): a process-level registry of traders. No teacher
//! counterpart exists (the teacher's `Engine` runs one fixed pair list per
//! process) — grounded in the teacher's `web-server::AppState` sharing
//! pattern (an `Arc`-wrapped, `RwLock`-guarded shared map read by HTTP
//! handlers and written by background workers) and in `Engine::run`'s
//! `tokio::spawn` + `JoinHandle` fan-out for trader lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;

use app_config::Settings;
use core_types::{AccountSnapshot, Symbol, TraderConfig};
use database::{ConfigStore, Db};
use events::{TraderStatus, WsMessage};
use market_feeder::MarketFeeder;

use crate::adapter_factory;
use crate::error::{Error, Result};
use crate::trader::{Trader, TraderRuntime};

const COMPETITION_CACHE_TTL: ChronoDuration = ChronoDuration::seconds(30);

/// A read-only copy of one trader's config and live status (§4.F "read
/// views; snapshots are copies, never the live maps").
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraderView {
    pub config: TraderConfig,
    pub status: TraderStatus,
    pub cycle_index: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_account: Option<AccountSnapshot>,
}

/// One row of the cross-trader competition aggregation (§4.F
/// `competition_view`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompetitionEntry {
    pub trader_id: String,
    pub owner_id: String,
    pub status: TraderStatus,
    pub roi: rust_decimal::Decimal,
    pub open_position_count: usize,
    pub last_decision_at: Option<DateTime<Utc>>,
}

struct TraderHandle {
    config: TraderConfig,
    runtime: Arc<std::sync::Mutex<TraderRuntime>>,
    cancel_tx: Option<watch::Sender<bool>>,
    join_handle: Option<JoinHandle<()>>,
}

impl TraderHandle {
    fn idle(config: TraderConfig) -> Self {
        Self {
            config,
            runtime: Arc::new(std::sync::Mutex::new(TraderRuntime::default())),
            cancel_tx: None,
            join_handle: None,
        }
    }

    fn view(&self) -> TraderView {
        let runtime = self.runtime.lock().expect("trader runtime mutex poisoned");
        TraderView {
            config: self.config.clone(),
            status: runtime.status,
            cycle_index: runtime.cycle_index,
            last_cycle_at: runtime.last_cycle_at,
            last_account: runtime.last_account.clone(),
        }
    }
}

/// Whether `user` owns `config`: either an exact owner-id match, or the
/// trader id carries `user`'s prefix (`"<user>-..."`), per §4.F's
/// user-scoping rule.
fn belongs_to_user(config: &TraderConfig, user: &str) -> bool {
    config.owner_id == user || config.id.starts_with(&format!("{user}-"))
}

pub struct Manager {
    traders: RwLock<HashMap<String, TraderHandle>>,
    store: Arc<dyn ConfigStore>,
    feeder: Arc<MarketFeeder>,
    db: Db,
    ws_tx: broadcast::Sender<WsMessage>,
    settings: Settings,
    competition_cache: AsyncMutex<Option<(DateTime<Utc>, Vec<CompetitionEntry>)>>,
}

impl Manager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        feeder: Arc<MarketFeeder>,
        db: Db,
        ws_tx: broadcast::Sender<WsMessage>,
        settings: Settings,
    ) -> Self {
        Self {
            traders: RwLock::new(HashMap::new()),
            store,
            feeder,
            db,
            ws_tx,
            settings,
            competition_cache: AsyncMutex::new(None),
        }
    }

    fn default_symbol_pool(&self) -> Vec<Symbol> {
        self.settings
            .default_symbol_pool
            .iter()
            .map(|raw| Symbol::normalize(raw))
            .collect()
    }

    /// Materializes every trader belonging to `user` (or every trader, if
    /// `None`) from the configuration store into the registry as `Idle`.
    /// Does not start them.
    pub async fn load_from_store(&self, user: Option<&str>) -> Result<()> {
        let configs = self.store.list_traders().await?;
        let mut traders = self.traders.write().await;
        for config in configs {
            if let Some(user) = user {
                if !belongs_to_user(&config, user) {
                    continue;
                }
            }
            traders.entry(config.id.clone()).or_insert_with(|| TraderHandle::idle(config));
        }
        Ok(())
    }

    /// Registers a trader config, or updates it in place if already
    /// present. Does not affect a running trader's in-flight cycle.
    pub async fn add(&self, config: TraderConfig) -> Result<()> {
        let mut traders = self.traders.write().await;
        match traders.get_mut(&config.id) {
            Some(handle) => handle.config = config,
            None => {
                traders.insert(config.id.clone(), TraderHandle::idle(config));
            }
        }
        Ok(())
    }

    /// Idempotent: starting an already-running trader is a no-op.
    pub async fn start(&self, id: &str) -> Result<()> {
        let config = {
            let traders = self.traders.read().await;
            let handle = traders.get(id).ok_or_else(|| Error::TraderNotFound(id.to_string()))?;
            if matches!(handle.runtime.lock().expect("poisoned").status, TraderStatus::Running) {
                return Ok(());
            }
            handle.config.clone()
        };

        let exchange_config = self
            .store
            .get_exchange(&config.exchange_ref)
            .await?
            .ok_or_else(|| Error::ExchangeConfigNotFound(config.exchange_ref.clone()))?;
        let ai_model_config = self
            .store
            .get_ai_model(&config.ai_ref)
            .await?
            .ok_or_else(|| Error::AiModelConfigNotFound(config.ai_ref.clone()))?;

        let adapter = adapter_factory::build(&exchange_config)?;
        let ai_client = api_client::AiClient::new(
            ai_model_config.base_url.clone(),
            ai_model_config.api_key.clone(),
            ai_model_config.model.clone(),
        )
        .with_max_tokens(app_config::effective_max_tokens(&ai_model_config));

        // The feeder only streams/backfills symbols it has been told about
        // (§3 "created lazily on first symbol request"); a trader's universe
        // must be registered before its loop can produce any market data.
        let default_symbol_pool = self.default_symbol_pool();
        let universe = crate::trader::resolve_universe(&config, &default_symbol_pool);
        self.feeder.initialize(&universe).await;

        let mut traders = self.traders.write().await;
        let handle = traders.get_mut(id).ok_or_else(|| Error::TraderNotFound(id.to_string()))?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let runtime = handle.runtime.clone();
        let trader = Trader::new(
            config,
            ai_client,
            adapter,
            self.feeder.clone(),
            self.db.clone(),
            self.ws_tx.clone(),
            default_symbol_pool,
            runtime,
        );

        let join_handle = tokio::spawn(trader.run(cancel_rx));
        handle.cancel_tx = Some(cancel_tx);
        handle.join_handle = Some(join_handle);
        Ok(())
    }

    /// Idempotent: stopping an already-stopped trader is a no-op. Signals
    /// the cancellation flag and returns immediately; the trader transitions
    /// through `Stopping` to `Stopped` on its own once the in-flight cycle
    /// (if any) finishes.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let traders = self.traders.read().await;
        let handle = traders.get(id).ok_or_else(|| Error::TraderNotFound(id.to_string()))?;
        if let Some(cancel_tx) = &handle.cancel_tx {
            let _ = cancel_tx.send(true);
        }
        Ok(())
    }

    /// Idempotent: stops the trader (if running), awaits its termination,
    /// then removes it from the registry.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.stop(id).await?;

        let join_handle = {
            let mut traders = self.traders.write().await;
            traders.get_mut(id).and_then(|handle| handle.join_handle.take())
        };
        if let Some(join_handle) = join_handle {
            let _ = join_handle.await;
        }

        self.traders.write().await.remove(id);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<TraderView> {
        let traders = self.traders.read().await;
        traders
            .get(id)
            .map(TraderHandle::view)
            .ok_or_else(|| Error::TraderNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<TraderView> {
        self.traders.read().await.values().map(TraderHandle::view).collect()
    }

    pub async fn list_for(&self, user: &str) -> Vec<TraderView> {
        self.traders
            .read()
            .await
            .values()
            .filter(|handle| belongs_to_user(&handle.config, user))
            .map(TraderHandle::view)
            .collect()
    }

    /// Cross-trader aggregation, cached for at most 30 s. Holding the cache
    /// mutex across the recompute is the single-flight lock §4.F asks for:
    /// concurrent callers during a cache miss queue behind the first
    /// recompute rather than each redoing the work.
    pub async fn competition_view(&self) -> Vec<CompetitionEntry> {
        let mut cache = self.competition_cache.lock().await;
        if let Some((computed_at, entries)) = cache.as_ref() {
            if Utc::now() - *computed_at < COMPETITION_CACHE_TTL {
                return entries.clone();
            }
        }

        let entries = self.compute_competition_view().await;
        *cache = Some((Utc::now(), entries.clone()));
        entries
    }

    async fn compute_competition_view(&self) -> Vec<CompetitionEntry> {
        let traders = self.traders.read().await;
        traders
            .values()
            .map(|handle| {
                let view = handle.view();
                let roi = match &view.last_account {
                    Some(account) if !view.config.initial_balance.is_zero() => {
                        (account.total_equity - view.config.initial_balance) / view.config.initial_balance
                    }
                    _ => rust_decimal::Decimal::ZERO,
                };
                let open_position_count = view.last_account.as_ref().map_or(0, |a| a.positions.len());
                CompetitionEntry {
                    trader_id: view.config.id.clone(),
                    owner_id: view.config.owner_id.clone(),
                    status: view.status,
                    roi,
                    open_position_count,
                    last_decision_at: view.last_cycle_at,
                }
            })
            .collect()
    }

    /// Stops every trader then shuts down the shared market feeder. Called
    /// once at process shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.traders.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.remove(&id).await;
        }
        self.feeder.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MarginMode, SymbolUniversePolicy};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config(id: &str, owner_id: &str) -> TraderConfig {
        TraderConfig {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            ai_ref: "m1".to_string(),
            exchange_ref: "e1".to_string(),
            initial_balance: dec!(10000),
            scan_interval: Duration::from_secs(180),
            btc_eth_leverage: 10,
            altcoin_leverage: 5,
            margin_mode: MarginMode::Cross,
            prompt_template_ref: "default".to_string(),
            custom_prompt: None,
            symbol_universe: SymbolUniversePolicy {
                custom_symbols: vec![],
                include_default_pool: true,
            },
        }
    }

    #[test]
    fn owner_id_match_belongs_to_user() {
        assert!(belongs_to_user(&config("t1", "alice"), "alice"));
    }

    #[test]
    fn trader_id_prefix_belongs_to_user() {
        assert!(belongs_to_user(&config("alice-main", "some-internal-id"), "alice"));
    }

    #[test]
    fn unrelated_trader_does_not_belong_to_user() {
        assert!(!belongs_to_user(&config("t1", "bob"), "alice"));
    }
}
