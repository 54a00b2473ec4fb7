use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("AI output did not contain a parseable intent array: {0}")]
    ParseFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
