use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
