//! The `error` module defines the error types used across `roverlink`.
//!
//! Core session operations never return these directly; they report request
//! acceptance through [`crate::session::Response`]. The types here describe
//! what went wrong underneath (a socket, a malformed filter, a bad setting)
//! and are folded into a response message at the call site.

use thiserror::Error;

use crate::session::ResultCode;

/// Failures raised by a transport while creating or driving a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport channel closed")]
    ChannelClosed,

    #[error("transport already disposed")]
    Disposed,

    #[error("{0}")]
    Other(String),
}

/// Reasons a topic or subscription filter is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic must not be empty")]
    Empty,

    #[error("topic `{0}` contains an empty level")]
    EmptyLevel(String),

    #[error("`>` may only appear as the last level of `{0}`")]
    MisplacedMultiLevel(String),

    #[error("topic `{0}` must not contain wildcards")]
    WildcardInTopic(String),
}

/// A non-OK [`ResultCode`] turned into an error, for callers that prefer `?`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct SessionError {
    pub code: ResultCode,
    pub message: String,
}

/// Configuration could not be loaded or is incomplete.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}
