use serde::Serialize;
use thiserror::Error;

use crate::machine::State;

/// Construction-time configuration errors. These are programmer errors and
/// are the only errors the controller ever returns to its caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed {field} definition. Must be a plain object. Received: {received}")]
    NotARecord { field: &'static str, received: String },

    #[error("malformed {field} definition. Must be an array. Received: {received}")]
    NotAnArray { field: &'static str, received: String },

    #[error("unknown state: {0}")]
    UnknownState(String),

    #[error("unknown hook: {0}")]
    UnknownHook(String),

    #[error("invalid transition definition: {0}")]
    InvalidTransition(String),

    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine error codes, numbered the way the transition engine reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionErrorCode {
    InvalidTransition = 100,
    PendingTransition = 200,
    UnknownEvent = 300,
}

impl TransitionErrorCode {
    pub fn code(&self) -> u16 {
        *self as u16
    }
}

/// A transition the engine refused to perform. State is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct TransitionError {
    pub event_name: String,
    pub from: State,
    pub to: State,
    pub code: TransitionErrorCode,
    pub message: String,
}

impl TransitionError {
    pub(crate) fn invalid(event_name: &str, from: State, to: State) -> Self {
        Self {
            event_name: event_name.to_string(),
            from,
            to,
            code: TransitionErrorCode::InvalidTransition,
            message: format!("event {event_name} inappropriate in current state {from}"),
        }
    }

    pub(crate) fn pending(event_name: &str, from: State, to: State) -> Self {
        Self {
            event_name: event_name.to_string(),
            from,
            to,
            code: TransitionErrorCode::PendingTransition,
            message: format!(
                "event {event_name} inappropriate because previous transition did not complete"
            ),
        }
    }

    pub(crate) fn unknown(event_name: &str, from: State, to: State) -> Self {
        Self {
            event_name: event_name.to_string(),
            from,
            to,
            code: TransitionErrorCode::UnknownEvent,
            message: format!("no transition leads to state {to}"),
        }
    }
}

/// Writes against a context snapshot always fail with this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("can't add property {key}, object is not extensible")]
    NotExtensible { key: String },

    #[error("malformed context definition. Must be a plain object. Received: {0}")]
    NotARecord(String),
}

/// A fault raised by a user-supplied hook handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ContextError> for HandlerError {
    fn from(err: ContextError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<TransitionError> for HandlerError {
    fn from(err: TransitionError) -> Self {
        Self::new(err.message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
