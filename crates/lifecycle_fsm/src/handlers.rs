//! Hook handlers
//!
//! A handler receives the event bundle for one hook invocation and may hand
//! back a partial context update. Every hook slot always has a handler; slots
//! nobody configured hold [`Noop`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use crate::error::HandlerError;
use crate::machine::{EventBundle, Hook};

/// What a handler returns: an optional partial context on success.
pub type HandlerResult = Result<Option<Value>, HandlerError>;

/// The single capability a hook handler provides.
pub trait StateHandler: Send + Sync {
    fn invoke(&self, bundle: &EventBundle) -> HandlerResult;
}

impl<F> StateHandler for F
where
    F: Fn(&EventBundle) -> HandlerResult + Send + Sync,
{
    fn invoke(&self, bundle: &EventBundle) -> HandlerResult {
        self(bundle)
    }
}

/// Default handler: does nothing, updates nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl StateHandler for Noop {
    fn invoke(&self, _bundle: &EventBundle) -> HandlerResult {
        Ok(None)
    }
}

pub type SharedHandler = Arc<dyn StateHandler>;

/// Handler per hook slot.
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<Hook, SharedHandler>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        let noop: SharedHandler = Arc::new(Noop);
        Self {
            handlers: Hook::all()
                .into_iter()
                .map(|hook| (hook, Arc::clone(&noop)))
                .collect(),
        }
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the handler for `hook`.
    pub fn insert(&mut self, hook: Hook, handler: SharedHandler) {
        self.handlers.insert(hook, handler);
    }

    pub fn get(&self, hook: Hook) -> SharedHandler {
        match self.handlers.get(&hook) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(Noop),
        }
    }

    /// Run the handler for `hook`, turning panics into handler faults.
    pub fn invoke(&self, hook: Hook, bundle: &EventBundle) -> HandlerResult {
        let handler = self.get(hook);
        match catch_unwind(AssertUnwindSafe(|| handler.invoke(bundle))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::new(panic_message(&*payload))),
        }
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut hooks: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        hooks.sort();
        f.debug_struct("HandlerTable").field("hooks", &hooks).finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
