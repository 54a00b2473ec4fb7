use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{Kline, OiSnapshot, Symbol, Timeframe};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Raw kline tuple as returned by a Binance-compatible `/klines` endpoint:
/// mixed-type JSON array, open/high/low/close/volume as strings.
#[derive(Debug, Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    String,
);

#[derive(Debug, Deserialize)]
struct OpenInterestResponse {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

#[derive(Debug, Deserialize)]
struct OpenInterestHistEntry {
    #[serde(rename = "sumOpenInterest")]
    sum_open_interest: String,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct PremiumIndexResponse {
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
}

/// A thin client over the venue's public (unauthenticated) market-data REST
/// endpoints. Separate from the per-trader, credentialed exchange adapter in
/// `api-client`: klines, open interest, and funding rate are public data the
/// singleton feeder fetches once for every tracked symbol.
#[derive(Clone)]
pub struct PublicMarketClient {
    http: reqwest::Client,
    base_url: String,
}

impl PublicMarketClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn fetch_klines(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u16,
    ) -> Result<Vec<Kline>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.0,
            timeframe.as_binance_interval(),
            limit
        );
        let body = self.http.get(&url).send().await?.text().await?;
        let raw: Vec<RawKline> = serde_json::from_str(&body).map_err(|e| {
            parse_error_envelope(&body).unwrap_or(Error::DeserializationFailed(e))
        })?;

        Ok(raw.into_iter().map(to_kline).collect())
    }

    pub async fn fetch_open_interest(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!(
            "{}/fapi/v1/openInterest?symbol={}",
            self.base_url, symbol.0
        );
        let body = self.http.get(&url).send().await?.text().await?;
        let parsed: OpenInterestResponse = serde_json::from_str(&body).map_err(|e| {
            parse_error_envelope(&body).unwrap_or(Error::DeserializationFailed(e))
        })?;
        Ok(parsed.open_interest.parse().unwrap_or_default())
    }

    /// History backfill (§4.A "OI history backfill, 15 m resolution, 20
    /// points"). Returns an empty vec rather than erroring when the venue
    /// has no history yet; the caller degrades to a single current sample.
    pub async fn fetch_open_interest_history(
        &self,
        symbol: &Symbol,
        limit: u16,
    ) -> Result<Vec<OiSnapshot>> {
        let url = format!(
            "{}/futures/data/openInterestHist?symbol={}&period=15m&limit={}",
            self.base_url, symbol.0, limit
        );
        let body = self.http.get(&url).send().await?.text().await?;
        let raw: Vec<OpenInterestHistEntry> = serde_json::from_str(&body).unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|entry| {
                Some(OiSnapshot {
                    value: entry.sum_open_interest.parse().ok()?,
                    timestamp: DateTime::<Utc>::from_timestamp_millis(entry.timestamp)?,
                })
            })
            .collect())
    }

    pub async fn fetch_funding_rate(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!(
            "{}/fapi/v1/premiumIndex?symbol={}",
            self.base_url, symbol.0
        );
        let body = self.http.get(&url).send().await?.text().await?;
        let parsed: PremiumIndexResponse = serde_json::from_str(&body).map_err(|e| {
            parse_error_envelope(&body).unwrap_or(Error::DeserializationFailed(e))
        })?;
        Ok(parsed.last_funding_rate.parse().unwrap_or_default())
    }
}

fn to_kline(raw: RawKline) -> Kline {
    Kline {
        open_time: raw.0,
        open: raw.1.parse().unwrap_or_default(),
        high: raw.2.parse().unwrap_or_default(),
        low: raw.3.parse().unwrap_or_default(),
        close: raw.4.parse().unwrap_or_default(),
        volume: raw.5.parse().unwrap_or_default(),
        close_time: raw.6,
        quote_volume: raw.7.parse().unwrap_or_default(),
        trade_count: raw.8,
    }
}

fn parse_error_envelope(body: &str) -> Option<Error> {
    let value: Value = serde_json::from_str(body).ok()?;
    let code = value.get("code")?.as_i64()?;
    let msg = value.get("msg").and_then(Value::as_str).unwrap_or("").to_string();
    Some(Error::Venue { code, msg })
}
