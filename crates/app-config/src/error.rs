use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load configuration")]
    LoadError(#[from] config::ConfigError),

    #[error("failed to load configuration due to IO error")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse TOML configuration")]
    TomlError(#[from] toml::de::Error),

    #[error("JWT secret has not been configured; refusing to issue tokens")]
    JwtSecretNotConfigured,
}

pub type Result<T> = std::result::Result<T, Error>;
