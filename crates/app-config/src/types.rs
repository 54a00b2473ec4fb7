use core_types::VenueAuth;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseSettings {
    /// The connection URL for the PostgreSQL database.
    pub url: String,
}

/// Endpoints for the public, venue-agnostic market data used by the
/// process-wide Market Feeder singleton (§4.A); unauthenticated, so unlike
/// `ExchangeConfig` this lives in process settings rather than the store.
#[derive(Deserialize, Debug, Clone)]
pub struct MarketDataSettings {
    pub rest_base_url: String,
    pub ws_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    pub log_level: String,
}

/// Top-level process settings, loaded from `config/base.toml` +
/// `config/<environment>.toml` + `APP__`-prefixed environment variables.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub market_data: MarketDataSettings,
    /// The system default symbol pool unioned into a trader's universe when
    /// its `symbol_universe.include_default_pool` is set (§4.E step 2).
    #[serde(default)]
    pub default_symbol_pool: Vec<String>,
}

/// One of the three provider shapes a trader's AI client may be configured
/// for (§9 "Dynamic dispatch → tagged variants").
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AiProvider {
    ChatCompletionA,
    ChatCompletionB,
    CustomOpenAiCompatible,
}

/// A single AI-model configuration record, as handed to the core by the
/// (opaque) configuration store.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AiModelConfig {
    pub id: String,
    pub provider: AiProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Which concrete adapter implementation an exchange config resolves to.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Venue {
    CexLike,
    PerpDexA,
    PerpDexB,
}

/// A single exchange configuration record, as handed to the core by the
/// (opaque) configuration store.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExchangeConfig {
    pub id: String,
    pub venue: Venue,
    pub rest_base_url: String,
    pub ws_base_url: String,
    pub auth: VenueAuth,
}

/// The default `max_tokens` applied to AI requests when neither the model
/// config nor the environment overrides it (§6 "AI_MAX_TOKENS").
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Resolves the effective max-tokens for a request: model config wins, then
/// the `AI_MAX_TOKENS` environment variable, then the hardcoded default.
pub fn effective_max_tokens(model_config: &AiModelConfig) -> u32 {
    if let Some(mt) = model_config.max_tokens {
        return mt;
    }
    std::env::var("AI_MAX_TOKENS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_TOKENS)
}
