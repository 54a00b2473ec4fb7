use super::ExchangeAdapter;
use crate::retry::retry_rate_limited_or_transient;
use crate::types::{OrderReceipt, SymbolPrecision};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{AccountSnapshot, MarginMode, Position, Side, Symbol, VenueAuth};
use ethers_signers::{LocalWallet, Signer};
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// Wallet-signed REST adapter for a permissioned-wallet perp-DEX venue: the
/// declared main-wallet identity is distinct from the delegated agent key
/// that actually signs each request, grounded on the `ethers-core`/
/// `ethers-signers` wallet-signing stack `aibysid-HyperLiquidMM` pulls in
/// for the same shape of venue.
pub struct PerpDexAdapter {
    http: Client,
    base_url: String,
    wallet_address: String,
    signer: LocalWallet,
    precision_cache: Mutex<HashMap<String, SymbolPrecision>>,
}

#[derive(Serialize)]
struct SignedRequest<'a> {
    action: Value,
    nonce: i64,
    wallet: &'a str,
    signature: SignatureHex,
}

#[derive(Serialize)]
struct SignatureHex {
    r: String,
    s: String,
    v: u8,
}

#[derive(Deserialize)]
struct OrderAck {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    avg_price: Decimal,
    #[serde(default)]
    filled_qty: Decimal,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AccountStateResponse {
    available_margin: Decimal,
    total_equity: Decimal,
    used_margin: Decimal,
    positions: Vec<PerpDexPosition>,
}

#[derive(Deserialize)]
struct PerpDexPosition {
    symbol: String,
    side: String,
    qty: Decimal,
    entry_price: Decimal,
    leverage: u8,
    unrealized_pnl: Decimal,
}

impl PerpDexAdapter {
    pub fn new(base_url: impl Into<String>, auth: &VenueAuth) -> Result<Self> {
        let VenueAuth::WalletSigner { wallet_address, signer_private_key } = auth else {
            return Err(Error::Rejected(
                "PerpDexAdapter requires a WalletSigner venue auth".into(),
            ));
        };
        let signer = LocalWallet::from_str(signer_private_key)
            .map_err(|e| Error::SigningFailed(e.to_string()))?;
        Ok(Self {
            http: Client::new(),
            base_url: base_url.into(),
            wallet_address: wallet_address.clone(),
            signer,
            precision_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn sign_and_send(&self, action: Value) -> Result<OrderAck> {
        let nonce = Utc::now().timestamp_millis();
        let message = serde_json::to_vec(&json!({ "action": &action, "nonce": nonce }))
            .map_err(Error::DeserializationFailed)?;
        let signature = self
            .signer
            .sign_message(&message)
            .await
            .map_err(|e| Error::SigningFailed(e.to_string()))?;

        let request = SignedRequest {
            action,
            nonce,
            wallet: &self.wallet_address,
            signature: SignatureHex {
                r: format!("{:#x}", signature.r),
                s: format!("{:#x}", signature.s),
                v: signature.v as u8,
            },
        };

        let url = format!("{}/exchange", self.base_url);
        let response = self.http.post(&url).json(&request).send().await?;
        let text = response.text().await?;
        let ack: OrderAck = serde_json::from_str(&text)?;
        if let Some(err) = &ack.error {
            return Err(classify_venue_error(err));
        }
        Ok(ack)
    }

    async fn precision_for(&self, symbol: &Symbol) -> Result<SymbolPrecision> {
        if let Some(p) = self.precision_cache.lock().get(&symbol.0) {
            return Ok(*p);
        }
        let url = format!("{}/info/meta?symbol={}", self.base_url, symbol.0);
        let body = self.http.get(&url).send().await?.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        let precision = SymbolPrecision {
            qty_step: value
                .get("qtyStep")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::new(1, 4)),
            price_step: value
                .get("priceStep")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::new(1, 1)),
            min_notional: value
                .get("minNotional")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::TEN),
        };
        self.precision_cache.lock().insert(symbol.0.clone(), precision);
        Ok(precision)
    }
}

fn classify_venue_error(msg: &str) -> Error {
    let lower = msg.to_lowercase();
    if lower.contains("margin") {
        Error::InsufficientMargin
    } else if lower.contains("rate limit") {
        Error::RateLimited
    } else if lower.contains("timeout") || lower.contains("unavailable") {
        Error::Transient(msg.to_string())
    } else {
        Error::Rejected(msg.to_string())
    }
}

#[async_trait]
impl ExchangeAdapter for PerpDexAdapter {
    async fn account(&self) -> Result<AccountSnapshot> {
        let url = format!("{}/info/account?wallet={}", self.base_url, self.wallet_address);
        let body = self.http.get(&url).send().await?.text().await?;
        let state: AccountStateResponse = serde_json::from_str(&body)?;

        let positions = state
            .positions
            .into_iter()
            .map(|p| {
                let symbol = Symbol::normalize(&p.symbol);
                let side = if p.side.eq_ignore_ascii_case("long") {
                    Side::Long
                } else {
                    Side::Short
                };
                (
                    symbol.clone(),
                    Position {
                        symbol,
                        side,
                        qty: p.qty,
                        entry_price: p.entry_price,
                        leverage: p.leverage,
                        unrealized_pnl: p.unrealized_pnl,
                    },
                )
            })
            .collect();

        Ok(AccountSnapshot {
            available_margin: state.available_margin,
            total_equity: state.total_equity,
            used_margin: state.used_margin,
            positions,
        })
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u8, mode: MarginMode) -> Result<()> {
        let action = json!({
            "type": "updateLeverage",
            "symbol": symbol.0,
            "leverage": leverage,
            "cross": mode == MarginMode::Cross,
        });
        retry_rate_limited_or_transient(|| self.sign_and_send(action.clone())).await?;
        Ok(())
    }

    async fn open(
        &self,
        symbol: &Symbol,
        side: Side,
        notional_quote: Decimal,
        leverage: u8,
    ) -> Result<OrderReceipt> {
        let precision = self.precision_for(symbol).await?;
        precision.check_min_notional(notional_quote)?;

        self.set_leverage(symbol, leverage, MarginMode::Cross).await?;

        let account = self.account().await?;
        let mark_price = account
            .positions
            .get(symbol)
            .map(|p| p.entry_price)
            .filter(|p| !p.is_zero())
            .unwrap_or(Decimal::ONE);
        let qty = precision.round_qty(notional_quote / mark_price)?;

        let action = json!({
            "type": "order",
            "symbol": symbol.0,
            "isBuy": side == Side::Long,
            "sz": qty.to_string(),
            "reduceOnly": false,
        });
        let ack = retry_rate_limited_or_transient(|| self.sign_and_send(action.clone())).await?;
        Ok(OrderReceipt {
            venue_order_id: ack.order_id,
            avg_price: ack.avg_price,
            filled_qty: ack.filled_qty,
        })
    }

    async fn close(&self, symbol: &Symbol) -> Result<OrderReceipt> {
        let account = self.account().await?;
        let position = account
            .positions
            .get(symbol)
            .ok_or_else(|| Error::Rejected(format!("no open position for {}", symbol.0)))?;

        let action = json!({
            "type": "order",
            "symbol": symbol.0,
            "isBuy": position.side == Side::Short,
            "sz": position.qty.to_string(),
            "reduceOnly": true,
        });
        let ack = retry_rate_limited_or_transient(|| self.sign_and_send(action.clone())).await?;
        Ok(OrderReceipt {
            venue_order_id: ack.order_id,
            avg_price: ack.avg_price,
            filled_qty: ack.filled_qty,
        })
    }

    async fn attach_bracket(
        &self,
        _symbol: &Symbol,
        _stop_price: Option<Decimal>,
        _take_price: Option<Decimal>,
    ) -> Result<Option<OrderReceipt>> {
        Err(Error::Unsupported(
            "this perp-DEX venue has no bracket-order primitive".into(),
        ))
    }
}
