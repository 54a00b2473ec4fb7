use thiserror::Error;

/// Errors raised by the Manager's registry operations (§4.F). The Trader
/// Loop itself never returns an error out of `run()` — per §7 every
/// unrecoverable runtime failure is caught, logged, and folded into the
/// next cycle's attempt instead of unwinding the task.
#[derive(Error, Debug)]
pub enum Error {
    #[error("trader {0} not found")]
    TraderNotFound(String),

    #[error("exchange config {0} not found")]
    ExchangeConfigNotFound(String),

    #[error("AI model config {0} not found")]
    AiModelConfigNotFound(String),

    #[error("failed to build exchange adapter: {0}")]
    AdapterBuildFailed(#[from] api_client::Error),

    #[error(transparent)]
    Database(#[from] database::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
