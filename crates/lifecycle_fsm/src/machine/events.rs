//! Machine events - What handlers and listeners receive
//!
//! Every transition attempt builds fresh [`EventBundle`]s, one per hook
//! invocation. Listeners subscribe to [`Topic`]s; handlers are bound to
//! [`Hook`]s.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::states::State;
use crate::context::Context;
use crate::error::{ConfigError, TransitionError};

/// Description of the transition being dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventInfo {
    /// Engine event name, e.g. `_ready`.
    pub name: String,
    pub from: State,
    pub to: State,
    /// Payload forwarded from the client event, or the fault message when
    /// the handler for this hook failed.
    pub msg: Option<String>,
}

/// Value handed to handlers and listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBundle {
    pub event: EventInfo,
    pub context: Context,
}

/// A handler slot. One per state for entering and for leaving, plus the two
/// universal hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Hook {
    /// Entering the named state; the topic is the bare state name.
    Enter(State),
    /// Leaving the named state; the topic is `leave<state>`.
    Leave(State),
    EnterState,
    LeaveState,
}

impl Hook {
    /// Every hook slot a default handler table covers.
    pub fn all() -> Vec<Hook> {
        let mut hooks: Vec<Hook> = State::ALL.iter().map(|s| Hook::Enter(*s)).collect();
        hooks.extend(State::ALL.iter().map(|s| Hook::Leave(*s)));
        hooks.push(Hook::EnterState);
        hooks.push(Hook::LeaveState);
        hooks
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Enter(state) => write!(f, "{state}"),
            Hook::Leave(state) => write!(f, "leave{state}"),
            Hook::EnterState => f.write_str("enterstate"),
            Hook::LeaveState => f.write_str("leavestate"),
        }
    }
}

impl From<Hook> for String {
    fn from(hook: Hook) -> Self {
        hook.to_string()
    }
}

impl FromStr for Hook {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enterstate" => return Ok(Hook::EnterState),
            "leavestate" => return Ok(Hook::LeaveState),
            _ => {}
        }

        if let Ok(state) = s.parse::<State>() {
            return Ok(Hook::Enter(state));
        }

        s.strip_prefix("leave")
            .and_then(|rest| rest.parse::<State>().ok())
            .map(Hook::Leave)
            .ok_or_else(|| ConfigError::UnknownHook(s.to_string()))
    }
}

/// Something a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Hook(Hook),
    StateError,
}

impl From<Hook> for Topic {
    fn from(hook: Hook) -> Self {
        Topic::Hook(hook)
    }
}

impl From<State> for Topic {
    fn from(state: State) -> Self {
        Topic::Hook(Hook::Enter(state))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Hook(hook) => write!(f, "{hook}"),
            Topic::StateError => f.write_str("stateError"),
        }
    }
}

impl FromStr for Topic {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "stateError" {
            return Ok(Topic::StateError);
        }
        s.parse::<Hook>().map(Topic::Hook)
    }
}

/// Payload of the `stateError` topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateError {
    /// The engine refused the transition.
    Rejected(TransitionError),
    /// A hook handler failed; `event.msg` carries the fault message.
    HandlerFault(EventBundle),
}

impl StateError {
    pub fn message(&self) -> &str {
        match self {
            StateError::Rejected(err) => &err.message,
            StateError::HandlerFault(bundle) => bundle.event.msg.as_deref().unwrap_or_default(),
        }
    }

    pub fn bundle(&self) -> Option<&EventBundle> {
        match self {
            StateError::HandlerFault(bundle) => Some(bundle),
            StateError::Rejected(_) => None,
        }
    }
}

/// Result of a single trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition was performed and every hook succeeded.
    Applied { from: State, to: State },
    /// The engine refused the transition; nothing ran and state is unchanged.
    Rejected(TransitionError),
    /// The transition was performed but at least one hook faulted.
    HandlerFaulted {
        from: State,
        to: State,
        messages: Vec<String>,
    },
}

impl TransitionOutcome {
    /// True when the state actually changed hands (including faulted hooks).
    pub fn is_applied(&self) -> bool {
        !matches!(self, TransitionOutcome::Rejected(_))
    }
}
