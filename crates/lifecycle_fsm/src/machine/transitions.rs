//! Transitions - The legal state graph and the engine that walks it
//!
//! The engine only validates and commits. Running hooks around a commit is
//! the controller's job, so the engine exposes a two-step `begin`/`commit`
//! protocol: between the two the transition is pending and any further
//! trigger is refused.

use std::collections::BTreeSet;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use super::states::State;
use crate::error::{ConfigError, TransitionError};

/// One edge family of the state graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Engine event name, e.g. `_ready`.
    pub name: String,
    pub from: Vec<State>,
    pub to: State,
}

impl Transition {
    pub fn new(name: impl Into<String>, from: &[State], to: State) -> Self {
        Self {
            name: name.into(),
            from: from.to_vec(),
            to,
        }
    }

    pub fn allows(&self, state: State) -> bool {
        self.from.contains(&state)
    }
}

/// Ordered list of transitions. Always holds the initial `none → start`
/// step, whatever the caller supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Transition>", into = "Vec<Transition>")]
pub struct TransitionTable {
    transitions: Vec<Transition>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use State::*;

        Self {
            transitions: vec![
                Transition::new("_start", &[None], Start),
                Transition::new("_connect", &[End, Start, Reconnecting, Error, Warning], Connect),
                Transition::new("_ready", &[Connect, Ready, Warning], Ready),
                Transition::new("_reconnecting", &[Connect, Ready, Error, Warning], Reconnecting),
                Transition::new(
                    "_end",
                    &[Connect, Start, Reconnecting, Error, Ready, Warning],
                    End,
                ),
                Transition::new(
                    "_error",
                    &[Connect, Start, Reconnecting, End, Ready, Warning],
                    Error,
                ),
                Transition::new(
                    "_warning",
                    &[Connect, Start, Reconnecting, End, Ready, Warning],
                    Warning,
                ),
            ],
        }
    }
}

impl TransitionTable {
    /// Build a table, rejecting empty names, empty source sets and
    /// duplicate targets (a target must map to exactly one trigger).
    /// A table without a way out of `none` gets the initial step added.
    pub fn new(mut transitions: Vec<Transition>) -> Result<Self, ConfigError> {
        let mut targets = BTreeSet::new();
        for transition in &transitions {
            if transition.name.trim().is_empty() {
                return Err(ConfigError::InvalidTransition(format!(
                    "transition to {} has an empty name",
                    transition.to
                )));
            }
            if transition.from.is_empty() {
                return Err(ConfigError::InvalidTransition(format!(
                    "transition {} has no source states",
                    transition.name
                )));
            }
            if !targets.insert(transition.to) {
                return Err(ConfigError::InvalidTransition(format!(
                    "more than one transition leads to {}",
                    transition.to
                )));
            }
        }

        match transitions.iter_mut().find(|t| t.to == State::Start) {
            Some(start) if !start.allows(State::None) => start.from.push(State::None),
            Some(_) => {}
            None => transitions.insert(0, Transition::new("_start", &[State::None], State::Start)),
        }
        Ok(Self { transitions })
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// The transition leading into `target`, if any.
    pub fn find(&self, target: State) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.to == target)
    }

    /// Distinct target states, in table order.
    pub fn targets(&self) -> Vec<State> {
        self.transitions.iter().map(|t| t.to).collect()
    }
}

impl TryFrom<Vec<Transition>> for TransitionTable {
    type Error = ConfigError;

    fn try_from(transitions: Vec<Transition>) -> Result<Self, Self::Error> {
        Self::new(transitions)
    }
}

impl From<TransitionTable> for Vec<Transition> {
    fn from(table: TransitionTable) -> Self {
        table.transitions
    }
}

/// A validated transition waiting for `commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStep {
    pub name: String,
    pub from: State,
    pub to: State,
}

#[derive(Debug)]
struct EngineState {
    current: State,
    pending: bool,
}

/// Drives a [`TransitionTable`]. Starts in `none`.
#[derive(Debug)]
pub struct Engine {
    table: TransitionTable,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            table,
            state: Mutex::new(EngineState {
                current: State::None,
                pending: false,
            }),
        }
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn current_state(&self) -> State {
        self.lock().current
    }

    pub fn is(&self, candidate: State) -> bool {
        self.current_state() == candidate
    }

    /// True when `target` is reachable from the current state right now.
    pub fn can(&self, target: State) -> bool {
        let state = self.lock();
        !state.pending
            && self
                .table
                .find(target)
                .is_some_and(|t| t.allows(state.current))
    }

    /// Validate a transition into `target` and mark it pending.
    pub fn begin(&self, target: State) -> Result<PendingStep, TransitionError> {
        let mut state = self.lock();
        let from = state.current;

        let Some(transition) = self.table.find(target) else {
            return Err(TransitionError::unknown(&target.event_name(), from, target));
        };
        if state.pending {
            return Err(TransitionError::pending(&transition.name, from, target));
        }
        if !transition.allows(from) {
            return Err(TransitionError::invalid(&transition.name, from, target));
        }

        state.pending = true;
        Ok(PendingStep {
            name: transition.name.clone(),
            from,
            to: target,
        })
    }

    /// Move to the pending step's target and clear the pending flag.
    pub fn commit(&self, step: &PendingStep) {
        let mut state = self.lock();
        state.current = step.to;
        state.pending = false;
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }
}
