//! Decision-log persistence and the opaque configuration-store surface
//! (§4.G, §6). Queries are written with `sqlx::query`/`sqlx::query_as` bound
//! at runtime rather than the `sqlx::query!` compile-time macros, since the
//! latter require a live database or a committed offline-query cache to
//! build against; nested structures are stored as JSONB via `sqlx::types::Json`
//! and scalar decimals as text.

pub mod config_store;
pub mod error;
pub mod types;

pub use config_store::{ConfigStore, InMemoryConfigStore, PgConfigStore};
pub use error::{Error, Result};
pub use types::{CycleRecord, OrderOutcome, OrderOutcomeKind};

use chrono::{DateTime, Utc};
use core_types::{Symbol, TradeOutcome};
use events::CycleStatus;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Thin, cheaply-`Clone`-able wrapper around a connection pool.
#[derive(Debug, Clone)]
pub struct Db(PgPool);

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        Ok(Self(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.0
    }

    /// Appends one decision-log row. Records are append-only; there is no
    /// update path (§4.G).
    pub async fn append_cycle(&self, record: &CycleRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decision_log (
                id, trader_id, cycle_index, started_at, ended_at, universe,
                account_before, account_after, market_digests, ai_raw_text,
                intents, decisions, order_outcomes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.trader_id)
        .bind(record.cycle_index)
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(Json(&record.universe))
        .bind(Json(&record.account_before))
        .bind(Json(&record.account_after))
        .bind(Json(&record.market_digests))
        .bind(&record.ai_raw_text)
        .bind(Json(&record.intents))
        .bind(Json(&record.decisions))
        .bind(Json(&record.order_outcomes))
        .bind(cycle_status_label(record.status))
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// The most recent `limit` cycle rows for a trader, newest first
    /// (§4.G "read by index").
    pub async fn recent_cycles(&self, trader_id: &str, limit: i64) -> Result<Vec<CycleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, trader_id, cycle_index, started_at, ended_at, universe,
                   account_before, account_after, market_digests, ai_raw_text,
                   intents, decisions, order_outcomes, status
            FROM decision_log
            WHERE trader_id = $1
            ORDER BY cycle_index DESC
            LIMIT $2
            "#,
        )
        .bind(trader_id)
        .bind(limit)
        .fetch_all(&self.0)
        .await?;
        rows.into_iter().map(row_to_cycle_record).collect()
    }

    /// Cycle rows for a trader within `[from, to]` (§4.G "read ... by time range").
    pub async fn cycles_in_range(
        &self,
        trader_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CycleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, trader_id, cycle_index, started_at, ended_at, universe,
                   account_before, account_after, market_digests, ai_raw_text,
                   intents, decisions, order_outcomes, status
            FROM decision_log
            WHERE trader_id = $1 AND started_at >= $2 AND started_at <= $3
            ORDER BY started_at ASC
            "#,
        )
        .bind(trader_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.0)
        .await?;
        rows.into_iter().map(row_to_cycle_record).collect()
    }

    /// Records one closed position's realized P/L, feeding the §4.D history
    /// summary.
    pub async fn record_trade_outcome(&self, trader_id: &str, outcome: &TradeOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trade_outcomes (id, trader_id, symbol, realized_pnl, closed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trader_id)
        .bind(&outcome.symbol.0)
        .bind(outcome.realized_pnl.to_string())
        .bind(outcome.closed_at)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// The last `limit` closed trades for a trader, newest first — raw
    /// material for the §4.D wins/losses/streak summary (`risk` does the
    /// summarizing; this just replays the rows).
    pub async fn recent_trade_outcomes(&self, trader_id: &str, limit: i64) -> Result<Vec<TradeOutcome>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, realized_pnl, closed_at
            FROM trade_outcomes
            WHERE trader_id = $1
            ORDER BY closed_at DESC
            LIMIT $2
            "#,
        )
        .bind(trader_id)
        .bind(limit)
        .fetch_all(&self.0)
        .await?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let symbol: String = row.try_get("symbol")?;
            let realized_pnl: String = row.try_get("realized_pnl")?;
            let closed_at: DateTime<Utc> = row.try_get("closed_at")?;
            let realized_pnl = Decimal::from_str(&realized_pnl)
                .map_err(|e| Error::NotFound(format!("corrupt realized_pnl: {e}")))?;
            outcomes.push(TradeOutcome {
                symbol: Symbol(symbol),
                realized_pnl,
                closed_at,
            });
        }
        Ok(outcomes)
    }

    /// Deletes decision-log rows older than `before`. Append-only records
    /// still need a floor in a real deployment; retention is configured
    /// externally (§4.G) — this is the thin wrapper a deployer wires to a
    /// scheduled sweep, off by default.
    pub async fn prune_older_than(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM decision_log WHERE started_at < $1")
            .bind(before)
            .execute(&self.0)
            .await?;
        Ok(result.rows_affected())
    }
}

fn cycle_status_label(status: CycleStatus) -> &'static str {
    match status {
        CycleStatus::Ok => "ok",
        CycleStatus::Partial => "partial",
        CycleStatus::Skipped => "skipped",
        CycleStatus::Failed => "failed",
    }
}

fn cycle_status_from_label(label: &str) -> Result<CycleStatus> {
    match label {
        "ok" => Ok(CycleStatus::Ok),
        "partial" => Ok(CycleStatus::Partial),
        "skipped" => Ok(CycleStatus::Skipped),
        "failed" => Ok(CycleStatus::Failed),
        other => Err(Error::NotFound(format!("unknown cycle status: {other}"))),
    }
}

fn row_to_cycle_record(row: sqlx::postgres::PgRow) -> Result<CycleRecord> {
    let status: String = row.try_get("status")?;
    Ok(CycleRecord {
        id: row.try_get("id")?,
        trader_id: row.try_get("trader_id")?,
        cycle_index: row.try_get("cycle_index")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        universe: row.try_get::<Json<_>, _>("universe")?.0,
        account_before: row.try_get::<Json<_>, _>("account_before")?.0,
        account_after: row.try_get::<Json<_>, _>("account_after")?.0,
        market_digests: row.try_get::<Json<_>, _>("market_digests")?.0,
        ai_raw_text: row.try_get("ai_raw_text")?,
        intents: row.try_get::<Json<_>, _>("intents")?.0,
        decisions: row.try_get::<Json<_>, _>("decisions")?.0,
        order_outcomes: row.try_get::<Json<_>, _>("order_outcomes")?.0,
        status: cycle_status_from_label(&status)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_status_label_round_trips() {
        for status in [
            CycleStatus::Ok,
            CycleStatus::Partial,
            CycleStatus::Skipped,
            CycleStatus::Failed,
        ] {
            let label = cycle_status_label(status);
            assert_eq!(cycle_status_from_label(label).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_label_is_rejected() {
        assert!(cycle_status_from_label("bogus").is_err());
    }
}
