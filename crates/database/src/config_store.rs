//! The opaque configuration store (§6): CRUD for traders, AI-model configs,
//! exchange configs, and system-level settings. The core only ever consumes
//! plaintext records through this trait — at-rest encryption, if any, is the
//! store's concern, not the core's.

use app_config::types::{AiModelConfig, ExchangeConfig};
use async_trait::async_trait;
use core_types::TraderConfig;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::Result;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_trader(&self, id: &str) -> Result<Option<TraderConfig>>;
    async fn list_traders(&self) -> Result<Vec<TraderConfig>>;
    async fn put_trader(&self, config: TraderConfig) -> Result<()>;
    async fn delete_trader(&self, id: &str) -> Result<()>;

    async fn get_ai_model(&self, id: &str) -> Result<Option<AiModelConfig>>;
    async fn put_ai_model(&self, config: AiModelConfig) -> Result<()>;

    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeConfig>>;
    async fn put_exchange(&self, config: ExchangeConfig) -> Result<()>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// An in-process store, useful for tests and for single-process deployments
/// that don't need the records to survive a restart.
#[derive(Default)]
pub struct InMemoryConfigStore {
    traders: RwLock<HashMap<String, TraderConfig>>,
    ai_models: RwLock<HashMap<String, AiModelConfig>>,
    exchanges: RwLock<HashMap<String, ExchangeConfig>>,
    settings: RwLock<HashMap<String, String>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_trader(&self, id: &str) -> Result<Option<TraderConfig>> {
        Ok(self.traders.read().await.get(id).cloned())
    }

    async fn list_traders(&self) -> Result<Vec<TraderConfig>> {
        Ok(self.traders.read().await.values().cloned().collect())
    }

    async fn put_trader(&self, config: TraderConfig) -> Result<()> {
        self.traders.write().await.insert(config.id.clone(), config);
        Ok(())
    }

    async fn delete_trader(&self, id: &str) -> Result<()> {
        self.traders.write().await.remove(id);
        Ok(())
    }

    async fn get_ai_model(&self, id: &str) -> Result<Option<AiModelConfig>> {
        Ok(self.ai_models.read().await.get(id).cloned())
    }

    async fn put_ai_model(&self, config: AiModelConfig) -> Result<()> {
        self.ai_models.write().await.insert(config.id.clone(), config);
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeConfig>> {
        Ok(self.exchanges.read().await.get(id).cloned())
    }

    async fn put_exchange(&self, config: ExchangeConfig) -> Result<()> {
        self.exchanges.write().await.insert(config.id.clone(), config);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A Postgres-backed store, one JSONB-valued row per record, matching the
/// JSONB convention used for the decision log.
#[derive(Debug, Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn get_trader(&self, id: &str) -> Result<Option<TraderConfig>> {
        let row = sqlx::query("SELECT config FROM traders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<TraderConfig>, _>("config")?.0),
            None => None,
        })
    }

    async fn list_traders(&self) -> Result<Vec<TraderConfig>> {
        let rows = sqlx::query("SELECT config FROM traders")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok(row.try_get::<Json<TraderConfig>, _>("config")?.0))
            .collect()
    }

    async fn put_trader(&self, config: TraderConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO traders (id, config) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config
            "#,
        )
        .bind(&config.id)
        .bind(Json(&config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_trader(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM traders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_ai_model(&self, id: &str) -> Result<Option<AiModelConfig>> {
        let row = sqlx::query("SELECT config FROM ai_models WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<AiModelConfig>, _>("config")?.0),
            None => None,
        })
    }

    async fn put_ai_model(&self, config: AiModelConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_models (id, config) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config
            "#,
        )
        .bind(&config.id)
        .bind(Json(&config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeConfig>> {
        let row = sqlx::query("SELECT config FROM exchanges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<Json<ExchangeConfig>, _>("config")?.0),
            None => None,
        })
    }

    async fn put_exchange(&self, config: ExchangeConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exchanges (id, config) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config
            "#,
        )
        .bind(&config.id)
        .bind(Json(&config))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MarginMode, SymbolUniversePolicy};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn sample_trader(id: &str) -> TraderConfig {
        TraderConfig {
            id: id.to_string(),
            owner_id: "user-1".to_string(),
            ai_ref: "model-1".to_string(),
            exchange_ref: "exchange-1".to_string(),
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

    #[tokio::test]
    async fn in_memory_store_round_trips_a_trader() {
        let store = InMemoryConfigStore::new();
        store.put_trader(sample_trader("t1")).await.unwrap();
        let fetched = store.get_trader("t1").await.unwrap();
        assert_eq!(fetched.unwrap().owner_id, "user-1");
    }

    #[tokio::test]
    async fn in_memory_store_delete_is_idempotent() {
        let store = InMemoryConfigStore::new();
        store.put_trader(sample_trader("t1")).await.unwrap();
        store.delete_trader("t1").await.unwrap();
        store.delete_trader("t1").await.unwrap();
        assert!(store.get_trader("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_store_settings_last_write_wins() {
        let store = InMemoryConfigStore::new();
        store.set_setting("ai_max_tokens", "1500").await.unwrap();
        store.set_setting("ai_max_tokens", "2500").await.unwrap();
        assert_eq!(
            store.get_setting("ai_max_tokens").await.unwrap(),
            Some("2500".to_string())
        );
    }
}
