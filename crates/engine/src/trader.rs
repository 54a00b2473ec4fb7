//! The Trader Loop (§4.E): one logical worker per trader, running the
//! wait -> snapshot -> prompt -> ask -> decide -> log cycle until stopped.
//! Generalizes the teacher's `TradingTask` (`engine/src/task.rs`): the same
//! long-lived `run(&mut self)` shape driven by a `watch`-channel cancel
//! signal (the pattern `market_feeder::MarketFeeder` already uses for its
//! own shutdown), but the tick is the trader's scan interval and an AI
//! round-trip rather than a kline stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use database::{Db, OrderOutcome, OrderOutcomeKind};
use events::{CycleStatus, TraderStatus, WsAccountUpdate, WsCycleCompleted, WsMessage, WsTraderStatusChanged};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use api_client::{AiClient, ExchangeAdapter};
use core_types::{AccountSnapshot, Decision, DecisionOp, Intent, MarketData, Side, Symbol, TraderConfig};
use market_feeder::MarketFeeder;

use crate::prompt;

/// Lightweight, frequently-updated state the Manager reads to build its
/// read views (§4.F) without touching the registry lock or blocking on the
/// trader's own exchange calls. Writes to this cell are the "dedicated
/// mutation API" §4.F calls for — the trader loop updates it directly
/// after each cycle rather than going back through the Manager.
#[derive(Debug, Clone)]
pub struct TraderRuntime {
    pub status: TraderStatus,
    pub cycle_index: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_account: Option<AccountSnapshot>,
}

impl Default for TraderRuntime {
    fn default() -> Self {
        Self {
            status: TraderStatus::Idle,
            cycle_index: 0,
            last_cycle_at: None,
            last_account: None,
        }
    }
}

pub struct Trader {
    id: String,
    config: TraderConfig,
    ai_client: AiClient,
    adapter: Box<dyn ExchangeAdapter>,
    feeder: Arc<MarketFeeder>,
    db: Db,
    ws_tx: broadcast::Sender<WsMessage>,
    default_symbol_pool: Vec<Symbol>,
    runtime: Arc<Mutex<TraderRuntime>>,
}

fn cancel_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// A trader's resolved symbol universe: its custom symbols plus the system
/// default pool, if opted in (§4.E step 2). Shared with the Manager, which
/// must initialize the feeder for this same set before the trader's first
/// cycle can produce any market data.
pub(crate) fn resolve_universe(config: &TraderConfig, default_symbol_pool: &[Symbol]) -> Vec<Symbol> {
    let mut universe: Vec<Symbol> = config.symbol_universe.custom_symbols.iter().cloned().collect();
    if config.symbol_universe.include_default_pool {
        universe.extend(default_symbol_pool.iter().cloned());
    }
    universe.sort();
    universe.dedup();
    universe
}

impl Trader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TraderConfig,
        ai_client: AiClient,
        adapter: Box<dyn ExchangeAdapter>,
        feeder: Arc<MarketFeeder>,
        db: Db,
        ws_tx: broadcast::Sender<WsMessage>,
        default_symbol_pool: Vec<Symbol>,
        runtime: Arc<Mutex<TraderRuntime>>,
    ) -> Self {
        Self {
            id: config.id.clone(),
            config,
            ai_client,
            adapter,
            feeder,
            db,
            ws_tx,
            default_symbol_pool,
            runtime,
        }
    }

    pub fn runtime(&self) -> Arc<Mutex<TraderRuntime>> {
        self.runtime.clone()
    }

    fn set_status(&self, status: TraderStatus) {
        self.runtime.lock().expect("trader runtime mutex poisoned").status = status;
        let _ = self.ws_tx.send(WsMessage::TraderStatusChanged(WsTraderStatusChanged {
            trader_id: self.id.clone(),
            status,
            at: Utc::now(),
        }));
    }

    /// Consumes the trader, running cycles until `cancel_rx` reports a stop
    /// request. Never returns an error: per §7, an unrecoverable failure is
    /// logged and the loop proceeds to the next scheduled tick.
    pub async fn run(mut self, mut cancel_rx: watch::Receiver<bool>) {
        self.set_status(TraderStatus::Running);

        loop {
            if cancel_requested(&cancel_rx) {
                break;
            }

            let interval = self.config.effective_scan_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel_rx.changed() => {}
            }

            if cancel_requested(&cancel_rx) {
                break;
            }

            self.run_cycle(&cancel_rx).await;
        }

        self.set_status(TraderStatus::Stopped);
    }

    fn resolve_universe(&self) -> Vec<Symbol> {
        resolve_universe(&self.config, &self.default_symbol_pool)
    }

    async fn run_cycle(&mut self, cancel_rx: &watch::Receiver<bool>) {
        let started_at = Utc::now();
        let universe = self.resolve_universe();

        let account_before = match self.adapter.account().await {
            Ok(account) => account,
            Err(err) => {
                tracing::error!(trader = %self.id, error = %err, "account snapshot failed, failing cycle");
                self.log_cycle(
                    started_at,
                    universe,
                    AccountSnapshot::default(),
                    AccountSnapshot::default(),
                    HashMap::new(),
                    String::new(),
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    CycleStatus::Failed,
                )
                .await;
                return;
            }
        };

        if cancel_requested(cancel_rx) {
            self.set_status(TraderStatus::Stopping);
            self.log_cycle(
                started_at,
                universe,
                account_before.clone(),
                account_before,
                HashMap::new(),
                String::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                CycleStatus::Skipped,
            )
            .await;
            return;
        }

        let mut market = HashMap::new();
        for symbol in &universe {
            match self.feeder.snapshot(symbol).await {
                Ok(data) => {
                    market.insert(symbol.clone(), data);
                }
                Err(err) => {
                    tracing::warn!(trader = %self.id, symbol = %symbol.0, error = %err, "dropping symbol for this cycle");
                }
            }
        }

        if market.is_empty() {
            tracing::warn!(trader = %self.id, "no symbol produced market data, skipping cycle");
            self.log_cycle(
                started_at,
                universe,
                account_before.clone(),
                account_before,
                HashMap::new(),
                String::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                CycleStatus::Skipped,
            )
            .await;
            return;
        }

        if cancel_requested(cancel_rx) {
            self.set_status(TraderStatus::Stopping);
            self.log_cycle(
                started_at,
                universe,
                account_before.clone(),
                account_before,
                market,
                String::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                CycleStatus::Skipped,
            )
            .await;
            return;
        }

        let outcomes = self.db.recent_trade_outcomes(&self.id, 20).await.unwrap_or_default();
        let history = risk::summarize(&outcomes);
        let system_prompt = prompt::system_prompt(
            &self.config.prompt_template_ref,
            self.config.custom_prompt.as_ref(),
            &history.to_prompt_text(),
        );
        let user_prompt = prompt::user_prompt(&market, &account_before);

        let ai_text = match self.ai_client.call(&system_prompt, &user_prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(trader = %self.id, error = %err, "AI call failed, failing cycle");
                self.log_cycle(
                    started_at,
                    universe,
                    account_before.clone(),
                    account_before,
                    market,
                    String::new(),
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    CycleStatus::Failed,
                )
                .await;
                return;
            }
        };

        let intents = match risk::parse_intents(&ai_text) {
            Ok(intents) => intents,
            Err(err) => {
                tracing::warn!(trader = %self.id, error = %err, "AI output malformed or empty, skipping cycle");
                self.log_cycle(
                    started_at,
                    universe,
                    account_before.clone(),
                    account_before,
                    market,
                    ai_text,
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    CycleStatus::Skipped,
                )
                .await;
                return;
            }
        };

        let validated = risk::validate_intents(intents.clone(), &universe, &market, &account_before, &self.config);
        let decisions = risk::resolve_actions(validated, &account_before, &self.config);

        if cancel_requested(cancel_rx) {
            self.set_status(TraderStatus::Stopping);
            self.log_cycle(
                started_at,
                universe,
                account_before.clone(),
                account_before,
                market,
                ai_text,
                intents,
                decisions,
                Vec::new(),
                CycleStatus::Skipped,
            )
            .await;
            return;
        }

        let (order_outcomes, had_failure) = self.execute_decisions(&decisions, &account_before, cancel_rx).await;

        let account_after = match self.adapter.account().await {
            Ok(account) => account,
            Err(_) => account_before.clone(),
        };

        let status = if had_failure { CycleStatus::Partial } else { CycleStatus::Ok };

        self.log_cycle(
            started_at,
            universe,
            account_before,
            account_after,
            market,
            ai_text,
            intents,
            decisions,
            order_outcomes,
            status,
        )
        .await;
    }

    async fn execute_decisions(
        &self,
        decisions: &[Decision],
        account_before: &AccountSnapshot,
        cancel_rx: &watch::Receiver<bool>,
    ) -> (Vec<OrderOutcome>, bool) {
        let mut order_outcomes = Vec::with_capacity(decisions.len());
        let mut had_failure = false;
        let mut aborted = false;

        for decision in decisions {
            if aborted || cancel_requested(cancel_rx) {
                aborted = true;
                order_outcomes.push(OrderOutcome {
                    symbol: decision.symbol.clone(),
                    kind: OrderOutcomeKind::Skipped {
                        reason: "stop requested".to_string(),
                    },
                });
                continue;
            }

            match &decision.op {
                DecisionOp::Noop { reason } => {
                    order_outcomes.push(OrderOutcome {
                        symbol: decision.symbol.clone(),
                        kind: OrderOutcomeKind::Skipped { reason: reason.clone() },
                    });
                }
                DecisionOp::Close => match self.execute_close(&decision.symbol, account_before).await {
                    Ok(outcome) => order_outcomes.push(outcome),
                    Err(reason) => {
                        had_failure = true;
                        order_outcomes.push(OrderOutcome {
                            symbol: decision.symbol.clone(),
                            kind: OrderOutcomeKind::Rejected { reason },
                        });
                    }
                },
                DecisionOp::OpenLong { notional, leverage, stop_loss, take_profit } => {
                    match self
                        .execute_open(&decision.symbol, Side::Long, *notional, *leverage, *stop_loss, *take_profit)
                        .await
                    {
                        Ok(outcome) => order_outcomes.push(outcome),
                        Err(reason) => {
                            had_failure = true;
                            order_outcomes.push(OrderOutcome {
                                symbol: decision.symbol.clone(),
                                kind: OrderOutcomeKind::Rejected { reason },
                            });
                        }
                    }
                }
                DecisionOp::OpenShort { notional, leverage, stop_loss, take_profit } => {
                    match self
                        .execute_open(&decision.symbol, Side::Short, *notional, *leverage, *stop_loss, *take_profit)
                        .await
                    {
                        Ok(outcome) => order_outcomes.push(outcome),
                        Err(reason) => {
                            had_failure = true;
                            order_outcomes.push(OrderOutcome {
                                symbol: decision.symbol.clone(),
                                kind: OrderOutcomeKind::Rejected { reason },
                            });
                        }
                    }
                }
            }
        }

        (order_outcomes, had_failure)
    }

    async fn execute_close(&self, symbol: &Symbol, account_before: &AccountSnapshot) -> Result<OrderOutcome, String> {
        let receipt = self.adapter.close(symbol).await.map_err(|err| err.to_string())?;

        if let Some(position) = account_before.positions.get(symbol) {
            let realized_pnl = match position.side {
                Side::Long => (receipt.avg_price - position.entry_price) * receipt.filled_qty,
                Side::Short => (position.entry_price - receipt.avg_price) * receipt.filled_qty,
            };
            let outcome = core_types::TradeOutcome {
                symbol: symbol.clone(),
                realized_pnl,
                closed_at: Utc::now(),
            };
            if let Err(err) = self.db.record_trade_outcome(&self.id, &outcome).await {
                tracing::warn!(trader = %self.id, symbol = %symbol.0, error = %err, "failed to record trade outcome");
            }
        }

        Ok(OrderOutcome {
            symbol: symbol.clone(),
            kind: OrderOutcomeKind::Filled {
                venue_order_id: receipt.venue_order_id,
                avg_price: receipt.avg_price,
                filled_qty: receipt.filled_qty,
            },
        })
    }

    async fn execute_open(
        &self,
        symbol: &Symbol,
        side: Side,
        notional: rust_decimal::Decimal,
        leverage: u8,
        stop_loss: Option<rust_decimal::Decimal>,
        take_profit: Option<rust_decimal::Decimal>,
    ) -> Result<OrderOutcome, String> {
        self.adapter
            .set_leverage(symbol, leverage, self.config.margin_mode)
            .await
            .map_err(|err| err.to_string())?;

        let receipt = self
            .adapter
            .open(symbol, side, notional, leverage)
            .await
            .map_err(|err| err.to_string())?;

        if stop_loss.is_some() || take_profit.is_some() {
            if let Err(err) = self.adapter.attach_bracket(symbol, stop_loss, take_profit).await {
                tracing::warn!(trader = %self.id, symbol = %symbol.0, error = %err, "bracket attach failed");
            }
        }

        Ok(OrderOutcome {
            symbol: symbol.clone(),
            kind: OrderOutcomeKind::Filled {
                venue_order_id: receipt.venue_order_id,
                avg_price: receipt.avg_price,
                filled_qty: receipt.filled_qty,
            },
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_cycle(
        &mut self,
        started_at: DateTime<Utc>,
        universe: Vec<Symbol>,
        account_before: AccountSnapshot,
        account_after: AccountSnapshot,
        market: HashMap<Symbol, MarketData>,
        ai_raw_text: String,
        intents: Vec<Intent>,
        decisions: Vec<Decision>,
        order_outcomes: Vec<OrderOutcome>,
        status: CycleStatus,
    ) {
        let ended_at = Utc::now();
        let mut digests: Vec<_> = market.values().map(core_types::MarketDataDigest::from).collect();
        digests.sort_by(|a, b| a.symbol.0.cmp(&b.symbol.0));

        let cycle_index = {
            let mut runtime = self.runtime.lock().expect("trader runtime mutex poisoned");
            runtime.cycle_index += 1;
            runtime.last_cycle_at = Some(ended_at);
            runtime.last_account = Some(account_after.clone());
            runtime.cycle_index
        };

        let record = database::CycleRecord {
            id: Uuid::new_v4(),
            trader_id: self.id.clone(),
            cycle_index: cycle_index as i64,
            started_at,
            ended_at,
            universe,
            account_before,
            account_after: account_after.clone(),
            market_digests: digests,
            ai_raw_text,
            intents,
            decisions: decisions.clone(),
            order_outcomes,
            status,
        };

        if let Err(err) = self.db.append_cycle(&record).await {
            tracing::error!(trader = %self.id, error = %err, "failed to append decision log entry");
        }

        let _ = self.ws_tx.send(WsMessage::CycleCompleted(WsCycleCompleted {
            trader_id: self.id.clone(),
            cycle_index,
            status,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
            universe: record.universe.clone(),
            decisions,
        }));
        let _ = self.ws_tx.send(WsMessage::AccountUpdate(WsAccountUpdate {
            trader_id: self.id.clone(),
            snapshot: account_after,
        }));
    }
}
