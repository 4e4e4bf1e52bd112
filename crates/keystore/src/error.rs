use crate::types::ValueType;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key '{key}' does not exist")]
    KeyNotFound { key: String },
    #[error("value for key '{key}' is not of the correct type")]
    TypeMismatch { key: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures seen by callers of the [`Client`](crate::client::Client) façade
#[derive(Debug, Error)]
pub enum ClientError {
    /// The store answered with an error message
    #[error("{0}")]
    Rejected(String),
    /// Nobody is serving the request channel, or the reply was dropped
    #[error("request channel closed")]
    Closed,
    #[error("value for key '{key}' is not of type {expected}")]
    UnexpectedValue { key: String, expected: ValueType },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("connection unusable after an earlier failure")]
    Disconnected,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
