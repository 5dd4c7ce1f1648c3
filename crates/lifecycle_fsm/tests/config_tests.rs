//! Tests for loading controller configuration from files

use std::io::Write;

use lifecycle_fsm::{
    Api, ConfigError, Controller, ControllerConfig, EventBundle, Hook, LocalClient, State,
};
use serde_json::json;
use tempfile::NamedTempFile;

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        r#"
        [context]
        host = "127.0.0.1"
        port = 6379

        [eventMap]
        reconnecting = "error"
        "#,
    );

    let config = ControllerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.context, json!({ "host": "127.0.0.1", "port": 6379 }));
    assert_eq!(config.trigger_for(State::Reconnecting), State::Error);
}

#[test]
fn test_load_json_file() {
    let file = write_config(
        ".json",
        r#"{
            "transitions": [
                { "name": "_start", "from": ["none"], "to": "start" },
                { "name": "_connect", "from": ["start", "end"], "to": "connect" },
                { "name": "_end", "from": ["connect"], "to": "end" }
            ]
        }"#,
    );

    let config = ControllerConfig::from_file(file.path()).unwrap();
    let mut client = LocalClient::new();
    let controller = Controller::attach(&mut client, Api::from_config(config));

    assert_eq!(client.event_names(), vec!["connect", "end", "start"]);

    client.emit("connect", None);
    client.emit("end", None);
    client.emit("connect", None);
    assert_eq!(controller.state(), State::Connect);

    assert!(!controller.ready().is_applied());
    assert_eq!(controller.state(), State::Connect);
}

#[test]
fn test_configured_controller_runs_handlers() {
    let config = ControllerConfig::from_json_str(r#"{ "context": { "attempts": 0 } }"#).unwrap();
    let api = Api::from_config(config).on(
        Hook::Enter(State::Reconnecting),
        |bundle: &EventBundle| {
            let attempts = bundle
                .context
                .get("attempts")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            Ok(Some(json!({ "attempts": attempts + 1 })))
        },
    );

    let mut client = LocalClient::new();
    let controller = Controller::attach(&mut client, api);
    for event in ["connect", "reconnecting", "connect", "reconnecting"] {
        client.emit(event, None);
    }

    assert_eq!(controller.context(), json!({ "attempts": 2 }));
}

#[test]
fn test_malformed_files() {
    let file = write_config(".toml", "context = \"not a table\"\n");
    assert!(matches!(
        ControllerConfig::from_file(file.path()),
        Err(ConfigError::NotARecord { field: "context", .. })
    ));

    let file = write_config(".json", "{ not json");
    assert!(matches!(
        ControllerConfig::from_file(file.path()),
        Err(ConfigError::Json(_))
    ));

    let file = write_config(
        ".toml",
        "transitions = [ { name = \"_x\", from = [\"none\"], to = \"online\" } ]\n",
    );
    assert!(matches!(
        ControllerConfig::from_file(file.path()),
        Err(ConfigError::UnknownState(name)) if name == "online"
    ));

    assert!(matches!(
        ControllerConfig::from_file("/nonexistent/lifecycle.toml"),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_table_without_start_still_starts() {
    let file = write_config(
        ".toml",
        r#"
        [[transitions]]
        name = "_connect"
        from = ["start"]
        to = "connect"
        "#,
    );

    let config = ControllerConfig::from_file(file.path()).unwrap();
    let mut client = LocalClient::new();
    let controller = Controller::attach(&mut client, Api::from_config(config));

    assert_eq!(controller.state(), State::Start);
    assert_eq!(client.event_names(), vec!["connect", "start"]);

    client.emit("connect", None);
    assert_eq!(controller.state(), State::Connect);
}
