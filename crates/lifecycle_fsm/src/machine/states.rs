//! Connection states - Defines every state a supervised client can be in
//!
//! The names mirror the lifecycle events a Redis-style client emits, plus the
//! implicit `none` state the machine sits in before its first transition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The lifecycle states of a supervised connection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Implicit initial state, left during construction.
    None,
    /// Controller constructed, client not yet connected.
    Start,
    /// Client opened its socket.
    Connect,
    /// Client is ready to accept commands.
    Ready,
    /// Client lost its connection and is retrying.
    Reconnecting,
    /// Connection closed.
    End,
    /// Client reported an error.
    Error,
    /// Client reported a warning.
    Warning,
}

impl State {
    /// Every state, `none` first.
    pub const ALL: [State; 8] = [
        State::None,
        State::Start,
        State::Connect,
        State::Ready,
        State::Reconnecting,
        State::End,
        State::Error,
        State::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::None => "none",
            State::Start => "start",
            State::Connect => "connect",
            State::Ready => "ready",
            State::Reconnecting => "reconnecting",
            State::End => "end",
            State::Error => "error",
            State::Warning => "warning",
        }
    }

    /// Name of the engine event that leads into this state (`_ready` for `ready`).
    pub fn event_name(&self) -> String {
        format!("_{}", self.as_str())
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownState(s.to_string()))
    }
}
