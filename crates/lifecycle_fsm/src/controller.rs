//! Lifecycle controller
//!
//! The [`Controller`] owns the current state (through its engine), the
//! authoritative context and the listener registries. Every trigger runs the
//! same protocol:
//!
//! 1. ask the engine to begin the transition; a refusal is published on
//!    `stateError` and nothing else happens;
//! 2. dispatch `leave<from>` and `leavestate`, commit, then dispatch
//!    `enterstate` and `<to>`;
//! 3. each dispatch hands the hook's handler a bundle built from the context
//!    as it was before the handler ran, merges whatever record it returns, and
//!    publishes the bundle on the hook's topic. A failing handler is reported
//!    on `stateError` first and its update is dropped.
//!
//! No lock is held while user code runs, so handlers and listeners may query
//! the controller or fire further triggers.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

use crate::bus::{EventBus, Subscription};
use crate::client::ClientEvents;
use crate::config::{Api, ControllerConfig};
use crate::context::Context;
use crate::error::ConfigError;
use crate::handlers::HandlerTable;
use crate::machine::{
    Engine, EventBundle, EventInfo, Hook, PendingStep, State, StateError, Topic,
    TransitionOutcome,
};

struct Inner {
    engine: Engine,
    handlers: HandlerTable,
    config: ControllerConfig,
    context: RwLock<Context>,
    bundles: EventBus<EventBundle>,
    errors: EventBus<StateError>,
}

/// Handle to a lifecycle state machine. Cloning shares the same machine.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Build a controller and immediately run the initial `none → start`
    /// transition, before any client event can reach it.
    pub fn new(api: Api) -> Self {
        let (config, handlers) = api.into_parts();
        let controller = Self {
            inner: Arc::new(Inner {
                engine: Engine::new(config.transition_table()),
                handlers,
                context: RwLock::new(config.context.clone()),
                config,
                bundles: EventBus::new(),
                errors: EventBus::new(),
            }),
        };

        let outcome = controller.start();
        tracing::debug!(?outcome, "Controller started");
        controller
    }

    /// Build from a dynamic definition, validating it first.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Api::from_value(value).map(Self::new)
    }

    /// Build a controller and subscribe it to `client`'s lifecycle events.
    pub fn attach<C>(client: &mut C, api: Api) -> Self
    where
        C: ClientEvents + ?Sized,
    {
        let controller = Self::new(api);
        controller.wire(client);
        controller
    }

    /// Register one callback on `client` per transition target. The raw
    /// event named after a target fires the trigger the event map selects
    /// (the same-named one by default). Callbacks hold a weak reference, so
    /// they become no-ops once every controller handle is dropped.
    pub fn wire<C>(&self, client: &mut C)
    where
        C: ClientEvents + ?Sized,
    {
        for raw in self.inner.engine.table().targets() {
            let trigger = self.inner.config.trigger_for(raw);
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            tracing::debug!(event = %raw, %trigger, "Wiring client event");

            client.on(
                raw.as_str(),
                Box::new(move |msg: Option<&str>| {
                    if let Some(inner) = weak.upgrade() {
                        Controller { inner }.trigger_with(trigger, msg);
                    }
                }),
            );
        }
    }

    pub fn state(&self) -> State {
        self.inner.engine.current_state()
    }

    /// Current context snapshot.
    pub fn context(&self) -> Context {
        self.inner.context.read().clone()
    }

    pub fn is(&self, candidate: State) -> bool {
        self.inner.engine.is(candidate)
    }

    /// True when triggering `target` right now would be accepted.
    pub fn can(&self, target: State) -> bool {
        self.inner.engine.can(target)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn trigger(&self, target: State) -> TransitionOutcome {
        self.trigger_with(target, None)
    }

    /// Attempt the transition into `target`, forwarding `msg` as `event.msg`.
    pub fn trigger_with(&self, target: State, msg: Option<&str>) -> TransitionOutcome {
        let step = match self.inner.engine.begin(target) {
            Ok(step) => step,
            Err(err) => {
                tracing::warn!(
                    event = %err.event_name,
                    from = %err.from,
                    to = %err.to,
                    code = err.code.code(),
                    "Transition rejected: {}",
                    err.message
                );
                self.inner
                    .errors
                    .publish(Topic::StateError, &StateError::Rejected(err.clone()));
                return TransitionOutcome::Rejected(err);
            }
        };

        tracing::debug!(event = %step.name, from = %step.from, to = %step.to, "Transition");

        let mut faults = Vec::new();
        self.dispatch(Hook::Leave(step.from), &step, msg, &mut faults);
        self.dispatch(Hook::LeaveState, &step, msg, &mut faults);
        self.inner.engine.commit(&step);
        self.dispatch(Hook::EnterState, &step, msg, &mut faults);
        self.dispatch(Hook::Enter(step.to), &step, msg, &mut faults);

        if faults.is_empty() {
            TransitionOutcome::Applied {
                from: step.from,
                to: step.to,
            }
        } else {
            TransitionOutcome::HandlerFaulted {
                from: step.from,
                to: step.to,
                messages: faults,
            }
        }
    }

    pub fn start(&self) -> TransitionOutcome {
        self.trigger(State::Start)
    }

    pub fn connect(&self) -> TransitionOutcome {
        self.trigger(State::Connect)
    }

    pub fn ready(&self) -> TransitionOutcome {
        self.trigger(State::Ready)
    }

    pub fn reconnecting(&self) -> TransitionOutcome {
        self.trigger(State::Reconnecting)
    }

    pub fn end(&self) -> TransitionOutcome {
        self.trigger(State::End)
    }

    pub fn error(&self) -> TransitionOutcome {
        self.trigger(State::Error)
    }

    pub fn warning(&self) -> TransitionOutcome {
        self.trigger(State::Warning)
    }

    /// Listen on a hook topic (`ready`, `leaveconnect`, `enterstate`, ...).
    pub fn subscribe<F>(&self, hook: Hook, listener: F) -> Subscription
    where
        F: Fn(&EventBundle) + Send + Sync + 'static,
    {
        self.inner
            .bundles
            .subscribe(Topic::Hook(hook), Arc::new(listener))
    }

    /// Listen for entry into `state`.
    pub fn on_state<F>(&self, state: State, listener: F) -> Subscription
    where
        F: Fn(&EventBundle) + Send + Sync + 'static,
    {
        self.subscribe(Hook::Enter(state), listener)
    }

    /// Listen on `stateError`: rejected transitions and handler faults.
    pub fn on_state_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StateError) + Send + Sync + 'static,
    {
        self.inner
            .errors
            .subscribe(Topic::StateError, Arc::new(listener))
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        match subscription.topic {
            Topic::StateError => self.inner.errors.unsubscribe(subscription),
            Topic::Hook(_) => self.inner.bundles.unsubscribe(subscription),
        }
    }

    /// Drop every listener on `topic`. Returns how many were removed.
    pub fn remove_all_listeners(&self, topic: Topic) -> usize {
        match topic {
            Topic::StateError => self.inner.errors.clear(topic),
            Topic::Hook(_) => self.inner.bundles.clear(topic),
        }
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        match topic {
            Topic::StateError => self.inner.errors.listener_count(topic),
            Topic::Hook(_) => self.inner.bundles.listener_count(topic),
        }
    }

    fn dispatch(
        &self,
        hook: Hook,
        step: &PendingStep,
        msg: Option<&str>,
        faults: &mut Vec<String>,
    ) {
        let mut bundle = EventBundle {
            event: EventInfo {
                name: step.name.clone(),
                from: step.from,
                to: step.to,
                msg: msg.map(str::to_string),
            },
            context: self.context(),
        };

        match self.inner.handlers.invoke(hook, &bundle) {
            Ok(update) => {
                bundle.context = match update {
                    Some(partial) => self.merge_context(&partial),
                    None => self.context(),
                };
            }
            Err(fault) => {
                tracing::warn!(
                    %hook,
                    event = %step.name,
                    from = %step.from,
                    to = %step.to,
                    "Handler fault: {}",
                    fault.message()
                );
                bundle.event.msg = Some(fault.message().to_string());
                bundle.context = self.context();
                faults.push(fault.message().to_string());
                self.inner.errors.publish(
                    Topic::StateError,
                    &StateError::HandlerFault(bundle.clone()),
                );
            }
        }

        self.inner.bundles.publish(Topic::Hook(hook), &bundle);
    }

    fn merge_context(&self, partial: &Value) -> Context {
        let mut context = self.inner.context.write();
        let merged = context.merge(partial);
        *context = merged.clone();
        merged
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("context", &self.context())
            .field("handlers", &self.inner.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransitionErrorCode;
    use crate::handlers::HandlerResult;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |entry: &str| sink.lock().push(entry.to_string()))
    }

    #[test]
    fn test_starts_on_construction() {
        let controller = Controller::new(Api::new());
        assert_eq!(controller.state(), State::Start);
        assert!(controller.is(State::Start));
        assert!(controller.context().is_empty());
    }

    #[test]
    fn test_hook_order() {
        let (log, record) = recorder();
        let mut api = Api::new();
        for hook in [
            Hook::Leave(State::Start),
            Hook::LeaveState,
            Hook::EnterState,
            Hook::Enter(State::Connect),
        ] {
            let record = record.clone();
            api = api.on(hook, move |_: &EventBundle| -> HandlerResult {
                record(&hook.to_string());
                Ok(None)
            });
        }

        let controller = Controller::new(api);
        log.lock().clear();

        controller.connect();
        assert_eq!(
            *log.lock(),
            vec!["leavestart", "leavestate", "enterstate", "connect"]
        );
    }

    #[test]
    fn test_state_visible_to_hooks() {
        let (log, record) = recorder();
        let slot: Arc<Mutex<Option<Controller>>> = Arc::new(Mutex::new(None));

        let leave_slot = Arc::clone(&slot);
        let leave_record = record.clone();
        let enter_slot = Arc::clone(&slot);
        let api = Api::new()
            .on(Hook::LeaveState, move |_: &EventBundle| -> HandlerResult {
                if let Some(c) = leave_slot.lock().as_ref() {
                    leave_record(c.state().as_str());
                }
                Ok(None)
            })
            .on(Hook::EnterState, move |_: &EventBundle| -> HandlerResult {
                if let Some(c) = enter_slot.lock().as_ref() {
                    record(c.state().as_str());
                }
                Ok(None)
            });

        let controller = Controller::new(api);
        *slot.lock() = Some(controller.clone());
        controller.connect();

        assert_eq!(*log.lock(), vec!["start", "connect"]);
    }

    #[test]
    fn test_trigger_during_leave_is_pending() {
        let slot: Arc<Mutex<Option<Controller>>> = Arc::new(Mutex::new(None));
        let handler_slot = Arc::clone(&slot);
        let api = Api::new().on(Hook::Leave(State::Start), move |_: &EventBundle| {
            let controller = handler_slot.lock().clone();
            if let Some(c) = controller {
                c.end();
            }
            Ok(None)
        });

        let controller = Controller::new(api);
        *slot.lock() = Some(controller.clone());

        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&codes);
        controller.on_state_error(move |err: &StateError| {
            if let StateError::Rejected(rejected) = err {
                sink.lock().push(rejected.code);
            }
        });

        assert!(controller.connect().is_applied());
        assert_eq!(controller.state(), State::Connect);
        assert_eq!(*codes.lock(), vec![TransitionErrorCode::PendingTransition]);
    }

    #[test]
    fn test_message_forwarded() {
        let controller = Controller::new(Api::new());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        controller.on_state(State::Warning, move |bundle: &EventBundle| {
            *sink.lock() = bundle.event.msg.clone();
        });

        controller.trigger_with(State::Warning, Some("password not required"));
        assert_eq!(seen.lock().as_deref(), Some("password not required"));
    }

    #[test]
    fn test_leave_handler_updates_context() {
        let api = Api::new().on(Hook::Leave(State::Start), |b: &EventBundle| {
            Ok(Some(json!({ "left": b.event.from })))
        });
        let controller = Controller::new(api);
        controller.connect();
        assert_eq!(controller.context(), json!({ "left": "start" }));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let controller = Controller::new(Api::new());
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let sub = controller.subscribe(Hook::EnterState, move |_: &EventBundle| {
            *sink.lock() += 1;
        });

        controller.connect();
        assert!(controller.unsubscribe(&sub));
        controller.ready();

        assert_eq!(*count.lock(), 1);
        assert_eq!(controller.listener_count(Topic::Hook(Hook::EnterState)), 0);
    }

    #[test]
    fn test_remove_all_listeners() {
        let controller = Controller::new(Api::new());
        let count = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let sink = Arc::clone(&count);
            controller.on_state(State::Connect, move |_: &EventBundle| *sink.lock() += 1);
        }
        controller.on_state_error(|_: &StateError| {});

        assert_eq!(controller.remove_all_listeners(Topic::from(State::Connect)), 2);
        assert_eq!(controller.remove_all_listeners(Topic::from(State::Connect)), 0);
        controller.connect();

        assert_eq!(*count.lock(), 0);
        assert_eq!(controller.listener_count(Topic::StateError), 1);
    }

    #[test]
    fn test_custom_table_without_start_still_starts() {
        let controller = Controller::from_value(json!({
            "transitions": [{ "name": "_connect", "from": ["start"], "to": "connect" }]
        }))
        .unwrap();
        assert_eq!(controller.state(), State::Start);
        assert!(controller.connect().is_applied());

        let controller = Controller::from_value(json!({ "transitions": [] })).unwrap();
        assert_eq!(controller.state(), State::Start);
    }

    #[test]
    fn test_dropped_controller_detaches_client() {
        let mut client = crate::client::LocalClient::new();
        let controller = Controller::attach(&mut client, Api::new());
        drop(controller);

        assert_eq!(client.emit("connect", None), 1);
    }
}
