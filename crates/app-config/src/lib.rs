use config::{Config, Environment, File};

pub mod error;
pub mod process;
pub mod types;

pub use error::{Error, Result};
pub use process::{JwtSecretHolder, TokenBlacklist};
pub use types::{
    effective_max_tokens, AiModelConfig, AiProvider, ExchangeConfig, MarketDataSettings, Settings,
    Venue, DEFAULT_MAX_TOKENS,
};

/// Loads the process-wide application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings() -> Result<Settings> {
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name("config/base"))
        .add_source(File::with_name(&format!("config/{environment}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;

    Ok(settings)
}

/// Loads a single AI-model configuration from a TOML fragment. In a full
/// deployment this record comes from the opaque configuration store (§6);
/// this loader is the on-disk fallback used by the CLI and by tests.
pub fn load_ai_model_config(path: &str) -> Result<AiModelConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Loads a single exchange configuration from a TOML fragment, same caveat
/// as [`load_ai_model_config`].
pub fn load_exchange_config(path: &str) -> Result<ExchangeConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
