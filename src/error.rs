//! Error type shared by the store, the session and the relay.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The storage medium could not be read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to load auth credentials: {0}")]
    AuthLoad(String),

    #[error("Failed to save auth credentials: {0}")]
    AuthSave(String),

    #[error("Malformed inbound message: {0}")]
    MalformedInbound(String),

    /// Credentials were revoked upstream; the device must be paired again.
    #[error("Session logged out, re-pairing required")]
    TerminalLogout,

    #[error("Transient disconnect: {0}")]
    TransientDisconnect(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::StorageUnavailable(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
