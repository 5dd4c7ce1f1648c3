//! Controller configuration
//!
//! [`ControllerConfig`] carries the data half of a controller definition: the
//! context seed, an optional transition table override and the client event
//! map. It can be built in code or loaded from JSON or TOML. [`Api`] adds the
//! hook handlers on top.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::ConfigError;
use crate::handlers::{HandlerResult, HandlerTable, SharedHandler};
use crate::machine::{EventBundle, Hook, State, Transition, TransitionTable};

/// Keys of a controller definition that configure the controller rather than
/// name a hook.
pub const RESERVED_KEYS: [&str; 3] = ["context", "transitions", "eventMap"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerConfig {
    pub context: Context,
    pub transitions: Option<TransitionTable>,
    /// Raw client event (named after a target state) to the trigger it fires.
    pub event_map: HashMap<State, State>,
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a dynamic definition. `null` counts as an empty definition;
    /// keys other than the reserved ones are ignored.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let record = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(record) => record,
            other => {
                return Err(ConfigError::NotARecord {
                    field: "api",
                    received: other.to_string(),
                })
            }
        };

        let context = match record.get("context") {
            None | Some(Value::Null) => Context::default(),
            Some(Value::Object(seed)) => Context::new(seed.clone()),
            Some(other) => {
                return Err(ConfigError::NotARecord {
                    field: "context",
                    received: other.to_string(),
                })
            }
        };

        let transitions = match record.get("transitions") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(parse_transitions(items)?),
            Some(other) => {
                return Err(ConfigError::NotAnArray {
                    field: "transitions",
                    received: other.to_string(),
                })
            }
        };

        let event_map = match record.get("eventMap") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => parse_event_map(map)?,
            Some(other) => {
                return Err(ConfigError::NotARecord {
                    field: "eventMap",
                    received: other.to_string(),
                })
            }
        };

        Ok(Self {
            context,
            transitions,
            event_map,
        })
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(input)?)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let table: toml::Value = toml::from_str(input)?;
        Self::from_value(serde_json::to_value(table)?)
    }

    /// Load from a `.toml` file, or treat anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        tracing::debug!(path = %path.display(), is_toml, "Loading controller configuration");
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// The table in effect: the override if one was given, else the default.
    pub fn transition_table(&self) -> TransitionTable {
        self.transitions.clone().unwrap_or_default()
    }

    /// Trigger fired for the raw client event named after `raw`.
    pub fn trigger_for(&self, raw: State) -> State {
        self.event_map.get(&raw).copied().unwrap_or(raw)
    }
}

fn parse_transitions(items: &[Value]) -> Result<TransitionTable, ConfigError> {
    let transitions = items
        .iter()
        .map(parse_transition)
        .collect::<Result<Vec<_>, _>>()?;
    TransitionTable::new(transitions)
}

fn parse_transition(item: &Value) -> Result<Transition, ConfigError> {
    let Value::Object(record) = item else {
        return Err(ConfigError::NotARecord {
            field: "transition",
            received: item.to_string(),
        });
    };

    let name = record
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::InvalidTransition(format!("missing name in {item}")))?;

    let from = match record.get("from") {
        Some(Value::Array(states)) => states
            .iter()
            .map(parse_state)
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(ConfigError::NotAnArray {
                field: "from",
                received: other.to_string(),
            })
        }
        None => {
            return Err(ConfigError::InvalidTransition(format!(
                "missing from in {item}"
            )))
        }
    };

    let to = record
        .get("to")
        .ok_or_else(|| ConfigError::InvalidTransition(format!("missing to in {item}")))
        .and_then(parse_state)?;

    Ok(Transition {
        name: name.to_string(),
        from,
        to,
    })
}

fn parse_state(value: &Value) -> Result<State, ConfigError> {
    match value {
        Value::String(name) => name.parse(),
        other => Err(ConfigError::UnknownState(other.to_string())),
    }
}

fn parse_event_map(map: &Map<String, Value>) -> Result<HashMap<State, State>, ConfigError> {
    map.iter()
        .map(|(raw, trigger)| -> Result<(State, State), ConfigError> {
            Ok((raw.parse()?, parse_state(trigger)?))
        })
        .collect()
}

/// Full controller definition: configuration plus hook handlers.
#[derive(Debug, Clone, Default)]
pub struct Api {
    config: ControllerConfig,
    handlers: HandlerTable,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ControllerConfig) -> Self {
        Self {
            config,
            handlers: HandlerTable::default(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        ControllerConfig::from_value(value).map(Self::from_config)
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.config.context = context;
        self
    }

    pub fn with_transitions(mut self, table: TransitionTable) -> Self {
        self.config.transitions = Some(table);
        self
    }

    /// Make the raw client event `raw` fire the `trigger` transition.
    pub fn map_event(mut self, raw: State, trigger: State) -> Self {
        self.config.event_map.insert(raw, trigger);
        self
    }

    /// Bind a closure to a hook.
    pub fn on<F>(self, hook: Hook, handler: F) -> Self
    where
        F: Fn(&EventBundle) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_handler(hook, Arc::new(handler))
    }

    pub fn with_handler(mut self, hook: Hook, handler: SharedHandler) -> Self {
        self.handlers.insert(hook, handler);
        self
    }

    /// Bind a handler by hook name (`ready`, `leaveconnect`, `enterstate`).
    /// Reserved configuration keys are dropped; unknown names are an error.
    pub fn on_named<F>(self, name: &str, handler: F) -> Result<Self, ConfigError>
    where
        F: Fn(&EventBundle) -> HandlerResult + Send + Sync + 'static,
    {
        if RESERVED_KEYS.contains(&name) {
            tracing::debug!(name, "Ignoring handler bound to reserved key");
            return Ok(self);
        }
        let hook = name.parse::<Hook>()?;
        Ok(self.on(hook, handler))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub(crate) fn into_parts(self) -> (ControllerConfig, HandlerTable) {
        (self.config, self.handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_empty_definition() {
        let config = ControllerConfig::from_value(Value::Null).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.transition_table(), TransitionTable::default());
    }

    #[test]
    fn test_rejects_non_record_api() {
        let err = ControllerConfig::from_value(json!("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::NotARecord { field: "api", .. }));
    }

    #[test]
    fn test_rejects_non_record_context() {
        let err = ControllerConfig::from_value(json!({ "context": 5 })).unwrap_err();
        assert!(matches!(err, ConfigError::NotARecord { field: "context", .. }));
    }

    #[test]
    fn test_rejects_non_array_transitions() {
        let err = ControllerConfig::from_value(json!({ "transitions": {} })).unwrap_err();
        assert!(matches!(err, ConfigError::NotAnArray { field: "transitions", .. }));
    }

    #[test]
    fn test_rejects_non_record_event_map() {
        let err = ControllerConfig::from_value(json!({ "eventMap": ["ready"] })).unwrap_err();
        assert!(matches!(err, ConfigError::NotARecord { field: "eventMap", .. }));
    }

    #[test]
    fn test_event_map_defaults_to_identity() {
        let config = ControllerConfig::from_value(json!({ "eventMap": { "ready": "connect" } }))
            .unwrap();
        assert_eq!(config.trigger_for(State::Ready), State::Connect);
        assert_eq!(config.trigger_for(State::End), State::End);
    }

    #[test]
    fn test_unknown_state_in_event_map() {
        let err = ControllerConfig::from_value(json!({ "eventMap": { "ready": "online" } }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownState(name) if name == "online"));
    }

    #[test]
    fn test_transitions_override() {
        let config = ControllerConfig::from_value(json!({
            "transitions": [
                { "name": "_start", "from": ["none"], "to": "start" },
                { "name": "_end", "from": ["start"], "to": "end" }
            ]
        }))
        .unwrap();

        let table = config.transition_table();
        assert_eq!(table.targets(), vec![State::Start, State::End]);
        assert!(table.find(State::Ready).is_none());
    }

    #[test]
    fn test_override_without_start_keeps_initial_step() {
        let config = ControllerConfig::from_value(json!({
            "transitions": [{ "name": "_connect", "from": ["start"], "to": "connect" }]
        }))
        .unwrap();

        let table = config.transition_table();
        assert_eq!(table.targets(), vec![State::Start, State::Connect]);
        assert!(table.find(State::Start).unwrap().allows(State::None));
    }

    #[test]
    fn test_empty_override_only_starts() {
        let config = ControllerConfig::from_value(json!({ "transitions": [] })).unwrap();
        assert_eq!(config.transition_table().targets(), vec![State::Start]);
    }

    #[test]
    fn test_toml_configuration() {
        let config = ControllerConfig::from_toml_str(
            r#"
            [context]
            service = "cache"

            [eventMap]
            ready = "connect"

            [[transitions]]
            name = "_start"
            from = ["none"]
            to = "start"
            "#,
        )
        .unwrap();

        assert_eq!(config.context, json!({ "service": "cache" }));
        assert_eq!(config.trigger_for(State::Ready), State::Connect);
        assert_eq!(config.transition_table().targets(), vec![State::Start]);
    }

    #[test]
    fn test_reserved_names_are_stripped() {
        let api = Api::new()
            .on_named("context", |_: &EventBundle| Ok(None))
            .unwrap()
            .on_named("leaveconnect", |_: &EventBundle| Ok(None))
            .unwrap();
        assert_eq!(api.config(), &ControllerConfig::default());
    }

    #[test]
    fn test_unknown_hook_name() {
        let err = Api::new()
            .on_named("connected", |_: &EventBundle| Ok(None))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHook(_)));
    }
}
