use thiserror::Error;

/// Errors raised by the exchange adapter (§4.B) and the AI client (§4.C).
/// Both polymorphic HTTP clients share one crate and one error vocabulary,
/// the way the teacher's `api-client::Error` covered every Binance endpoint.
#[derive(Error, Debug)]
pub enum Error {
    #[error("insufficient margin for this order")]
    InsufficientMargin,

    #[error("order size precision below venue minimum")]
    PrecisionTooLow,

    #[error("order notional below venue minimum")]
    BelowMinNotional,

    #[error("rate limited by venue")]
    RateLimited,

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("operation unsupported by this venue: {0}")]
    Unsupported(String),

    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),

    #[error("venue error {code}: {msg}")]
    Venue { code: i64, msg: String },

    #[error("failed to sign request: {0}")]
    SigningFailed(String),

    #[error("AI call failed after retries: {0}")]
    AiCallFailed(String),

    #[error("AI response had no choices")]
    AiEmptyResponse,
}

pub type Result<T> = std::result::Result<T, Error>;
