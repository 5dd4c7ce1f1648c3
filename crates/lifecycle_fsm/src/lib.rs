//! lifecycle_fsm - State machine controller for connection lifecycles
//!
//! A [`Controller`] supervises a long-lived client (a Redis-style connection)
//! by turning its raw lifecycle events into validated state transitions,
//! running user hook handlers around each transition, accumulating an
//! immutable context from what those handlers return, and publishing every
//! step to subscribers.

pub mod bus;
pub mod client;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod machine;

// Re-export commonly used types
pub use bus::Subscription;
pub use client::{pump, ClientCallback, ClientEvent, ClientEvents, LocalClient};
pub use config::{Api, ControllerConfig};
pub use context::Context;
pub use controller::Controller;
pub use error::{ConfigError, ContextError, HandlerError, TransitionError, TransitionErrorCode};
pub use handlers::{HandlerResult, Noop, StateHandler};
pub use machine::{
    EventBundle, EventInfo, Hook, State, StateError, Topic, Transition, TransitionOutcome,
    TransitionTable,
};
