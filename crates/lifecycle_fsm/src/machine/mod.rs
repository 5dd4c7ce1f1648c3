//! State machine module
//!
//! Contains the state graph, the transition engine and the event types the
//! controller dispatches.

mod events;
mod states;
mod transitions;

pub use events::{EventBundle, EventInfo, Hook, StateError, Topic, TransitionOutcome};
pub use states::State;
pub use transitions::{Engine, PendingStep, Transition, TransitionTable};
