use super::ExchangeAdapter;
use crate::retry::retry_rate_limited_or_transient;
use crate::types::{OrderReceipt, SymbolPrecision};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{AccountSnapshot, MarginMode, Position, Side, Symbol, VenueAuth};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct FuturesAsset {
    asset: String,
    wallet_balance: Decimal,
    available_balance: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct PositionInfo {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    unrealized_profit: Decimal,
    leverage: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AccountState {
    assets: Vec<FuturesAsset>,
    positions: Vec<PositionInfo>,
    total_margin_balance: Decimal,
    total_position_initial_margin: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderResponse {
    order_id: i64,
    avg_price: Decimal,
    executed_qty: Decimal,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    filters: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

/// HMAC-signed REST adapter for a centralized-exchange-style perpetuals
/// venue, grounded directly on the teacher's `ApiClient` signing and
/// account/order endpoints.
pub struct CexAdapter {
    http: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    precision_cache: Mutex<HashMap<String, SymbolPrecision>>,
}

impl CexAdapter {
    pub fn new(base_url: impl Into<String>, auth: &VenueAuth) -> Result<Self> {
        let VenueAuth::ApiKeySecret { api_key, api_secret } = auth else {
            return Err(Error::Rejected(
                "CexAdapter requires an ApiKeySecret venue auth".into(),
            ));
        };
        Ok(Self {
            http: Client::new(),
            api_key: api_key.clone(),
            api_secret: api_secret.clone(),
            base_url: base_url.into(),
            precision_cache: Mutex::new(HashMap::new()),
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts a key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, mut params: String) -> String {
        let timestamp = Utc::now().timestamp_millis();
        if !params.is_empty() {
            params.push('&');
        }
        params.push_str(&format!("timestamp={timestamp}"));
        let signature = self.sign(&params);
        params.push_str(&format!("&signature={signature}"));
        params
    }

    async fn precision_for(&self, symbol: &Symbol) -> Result<SymbolPrecision> {
        if let Some(p) = self.precision_cache.lock().get(&symbol.0) {
            return Ok(*p);
        }

        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let body = self.http.get(&url).send().await?.text().await?;
        let info: ExchangeInfoResponse = serde_json::from_str(&body)?;

        let mut cache = self.precision_cache.lock();
        for s in info.symbols {
            let mut precision = SymbolPrecision {
                qty_step: Decimal::new(1, 3),
                price_step: Decimal::new(1, 2),
                min_notional: Decimal::from(5),
            };
            for filter in &s.filters {
                match filter.get("filterType").and_then(Value::as_str) {
                    Some("LOT_SIZE") => {
                        if let Some(step) = filter.get("stepSize").and_then(Value::as_str) {
                            precision.qty_step = step.parse().unwrap_or(precision.qty_step);
                        }
                    }
                    Some("PRICE_FILTER") => {
                        if let Some(step) = filter.get("tickSize").and_then(Value::as_str) {
                            precision.price_step = step.parse().unwrap_or(precision.price_step);
                        }
                    }
                    Some("MIN_NOTIONAL") => {
                        if let Some(min) = filter.get("notional").and_then(Value::as_str) {
                            precision.min_notional = min.parse().unwrap_or(precision.min_notional);
                        }
                    }
                    _ => {}
                }
            }
            cache.insert(s.symbol, precision);
        }

        cache
            .get(&symbol.0)
            .copied()
            .ok_or_else(|| Error::Rejected(format!("unknown symbol on venue: {}", symbol.0)))
    }

    async fn place_order(
        &self,
        symbol: &Symbol,
        side: &str,
        order_type: &str,
        quantity: Option<Decimal>,
        stop_price: Option<Decimal>,
        reduce_only: bool,
    ) -> Result<NewOrderResponse> {
        let mut params = format!("symbol={}&side={side}&type={order_type}", symbol.0);
        if let Some(q) = quantity {
            params.push_str(&format!("&quantity={q}"));
        }
        if let Some(sp) = stop_price {
            params.push_str(&format!("&stopPrice={sp}"));
        }
        if reduce_only {
            params.push_str("&reduceOnly=true");
        }
        let params = self.signed_query(params);

        let url = format!("{}/fapi/v1/order", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .body(params)
            .send()
            .await?;
        let text = response.text().await?;
        self.parse_order_response(&text)
    }

    fn parse_order_response(&self, text: &str) -> Result<NewOrderResponse> {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            if let Some(code) = value.get("code").and_then(Value::as_i64) {
                let msg = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return Err(classify_venue_error(code, msg));
            }
        }
        Ok(serde_json::from_str(text)?)
    }
}

fn classify_venue_error(code: i64, msg: String) -> Error {
    match code {
        -2019 => Error::InsufficientMargin,
        -1003 => Error::RateLimited,
        -1021 | -1022 => Error::Transient(msg),
        _ => Error::Rejected(format!("{code}: {msg}")),
    }
}

#[async_trait]
impl ExchangeAdapter for CexAdapter {
    async fn account(&self) -> Result<AccountSnapshot> {
        let params = self.signed_query(String::new());
        let url = format!("{}/fapi/v2/account?{params}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let text = response.text().await?;
        let value: Value = serde_json::from_str(&text)?;
        if let Some(code) = value.get("code").and_then(Value::as_i64) {
            let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default().to_string();
            return Err(classify_venue_error(code, msg));
        }
        let state: AccountState = serde_json::from_value(value)?;

        let usdt = state
            .assets
            .iter()
            .find(|a| a.asset == "USDT")
            .cloned()
            .unwrap_or(FuturesAsset {
                asset: "USDT".into(),
                wallet_balance: Decimal::ZERO,
                available_balance: Decimal::ZERO,
            });

        let positions = state
            .positions
            .into_iter()
            .filter(|p| !p.position_amt.is_zero())
            .map(|p| {
                let side = if p.position_amt.is_sign_positive() {
                    Side::Long
                } else {
                    Side::Short
                };
                let symbol = Symbol::normalize(&p.symbol);
                (
                    symbol.clone(),
                    Position {
                        symbol,
                        side,
                        qty: p.position_amt.abs(),
                        entry_price: p.entry_price,
                        leverage: p.leverage.parse().unwrap_or(1),
                        unrealized_pnl: p.unrealized_profit,
                    },
                )
            })
            .collect();

        Ok(AccountSnapshot {
            available_margin: usdt.available_balance,
            total_equity: state.total_margin_balance,
            used_margin: state.total_position_initial_margin,
            positions,
        })
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u8, _mode: MarginMode) -> Result<()> {
        retry_rate_limited_or_transient(|| async {
            let params = self.signed_query(format!("symbol={}&leverage={leverage}", symbol.0));
            let url = format!("{}/fapi/v1/leverage", self.base_url);
            let response = self
                .http
                .post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .body(params)
                .send()
                .await?;
            let text = response.text().await?;
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                if let Some(code) = value.get("code").and_then(Value::as_i64) {
                    let msg = value.get("msg").and_then(Value::as_str).unwrap_or_default().to_string();
                    return Err(classify_venue_error(code, msg));
                }
            }
            Ok(())
        })
        .await
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
        let raw_qty = notional_quote / mark_price;
        let qty = precision.round_qty(raw_qty)?;

        let side_str = if side == Side::Long { "BUY" } else { "SELL" };
        let response = retry_rate_limited_or_transient(|| {
            self.place_order(symbol, side_str, "MARKET", Some(qty), None, false)
        })
        .await?;

        Ok(OrderReceipt {
            venue_order_id: response.order_id.to_string(),
            avg_price: response.avg_price,
            filled_qty: response.executed_qty,
        })
    }

    async fn close(&self, symbol: &Symbol) -> Result<OrderReceipt> {
        let account = self.account().await?;
        let position = account
            .positions
            .get(symbol)
            .ok_or_else(|| Error::Rejected(format!("no open position for {}", symbol.0)))?;

        let side_str = if position.side == Side::Long { "SELL" } else { "BUY" };
        let response = retry_rate_limited_or_transient(|| {
            self.place_order(symbol, side_str, "MARKET", Some(position.qty), None, true)
        })
        .await?;

        Ok(OrderReceipt {
            venue_order_id: response.order_id.to_string(),
            avg_price: response.avg_price,
            filled_qty: response.executed_qty,
        })
    }

    async fn attach_bracket(
        &self,
        symbol: &Symbol,
        stop_price: Option<Decimal>,
        take_price: Option<Decimal>,
    ) -> Result<Option<OrderReceipt>> {
        let account = self.account().await?;
        let position = account
            .positions
            .get(symbol)
            .ok_or_else(|| Error::Rejected(format!("no open position for {}", symbol.0)))?;
        let close_side = if position.side == Side::Long { "SELL" } else { "BUY" };

        let mut last_receipt = None;
        if let Some(sp) = stop_price {
            let response = retry_rate_limited_or_transient(|| {
                self.place_order(symbol, close_side, "STOP_MARKET", Some(position.qty), Some(sp), true)
            })
            .await?;
            last_receipt = Some(OrderReceipt {
                venue_order_id: response.order_id.to_string(),
                avg_price: response.avg_price,
                filled_qty: response.executed_qty,
            });
        }
        if let Some(tp) = take_price {
            let response = retry_rate_limited_or_transient(|| {
                self.place_order(symbol, close_side, "TAKE_PROFIT_MARKET", Some(position.qty), Some(tp), true)
            })
            .await?;
            last_receipt = Some(OrderReceipt {
                venue_order_id: response.order_id.to_string(),
                avg_price: response.avg_price,
                filled_qty: response.executed_qty,
            });
        }
        Ok(last_receipt)
    }
}
