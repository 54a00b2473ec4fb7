use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] engine::Error),

    #[error(transparent)]
    Database(#[from] database::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to bind server address: {0}")]
    ServerBindError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Engine(engine::Error::TraderNotFound(_)) => StatusCode::NOT_FOUND,
            Error::Engine(engine::Error::ExchangeConfigNotFound(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Engine(engine::Error::AiModelConfigNotFound(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Engine(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ServerBindError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
