//! Driving client surface
//!
//! The controller only needs one thing from the connection client it
//! supervises: a way to register a callback per named lifecycle event.
//! [`LocalClient`] is an in-process implementation, and [`pump`] feeds it
//! from a tokio channel so events arrive, and transitions run, in order.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedReceiver;

/// Callback registered on a client. Receives the event payload, if any.
pub type ClientCallback = Box<dyn Fn(Option<&str>) + Send + Sync>;

/// A client that emits named lifecycle events.
pub trait ClientEvents {
    fn on(&mut self, event: &str, callback: ClientCallback);
}

/// A raw lifecycle event as produced by a connection client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEvent {
    pub name: String,
    pub msg: Option<String>,
}

impl ClientEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            msg: None,
        }
    }

    pub fn with_msg(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            msg: Some(msg.into()),
        }
    }
}

/// In-process event emitter.
#[derive(Default)]
pub struct LocalClient {
    callbacks: HashMap<String, Vec<ClientCallback>>,
}

impl LocalClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every callback registered for `event`, in registration order.
    pub fn emit(&self, event: &str, msg: Option<&str>) -> usize {
        let Some(callbacks) = self.callbacks.get(event) else {
            tracing::trace!(event, "No callbacks registered");
            return 0;
        };
        for callback in callbacks {
            callback(msg);
        }
        callbacks.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.callbacks.get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ClientEvents for LocalClient {
    fn on(&mut self, event: &str, callback: ClientCallback) {
        self.callbacks
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }
}

impl std::fmt::Debug for LocalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClient")
            .field("events", &self.event_names())
            .finish()
    }
}

/// Deliver events from `events` to `client` until the sender side closes.
/// Returns the number of events delivered.
pub async fn pump(mut events: UnboundedReceiver<ClientEvent>, client: &LocalClient) -> usize {
    let mut delivered = 0;
    while let Some(event) = events.recv().await {
        tracing::debug!(event = %event.name, "Delivering client event");
        client.emit(&event.name, event.msg.as_deref());
        delivered += 1;
    }
    delivered
}
