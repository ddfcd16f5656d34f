// src/core/errors.rs

//! Defines the primary error type for the entire framework.

use thiserror::Error;

/// The main error enum, representing all possible failures within the client
/// library and the server daemon.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum JasperError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Incomplete frame in stream")]
    IncompleteFrame,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<std::str::Utf8Error> for JasperError {
    fn from(e: std::str::Utf8Error) -> Self {
        JasperError::Protocol(format!("invalid UTF-8 on the wire: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for JasperError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        JasperError::Protocol(format!("invalid UTF-8 on the wire: {e}"))
    }
}

impl From<sled::Error> for JasperError {
    fn from(e: sled::Error) -> Self {
        JasperError::Internal(format!("sled error: {e}"))
    }
}

impl From<serde_json::Error> for JasperError {
    fn from(e: serde_json::Error) -> Self {
        JasperError::Protocol(format!("document serialization error: {e}"))
    }
}
