//! Mode-aware fail-closed enforcement of `resolve_secrets_for_mode`.
//!
//! Uses globally-unique sentinel env var names that are never set in any CI
//! or dev environment, so tests never need `std::env::set_var` and sidestep
//! parallel-test races on env-var mutation.

use vigil_config::load_layered_yaml_from_strings;
use vigil_config::secrets::resolve_secrets_for_mode;

fn load(yaml: &str) -> serde_json::Value {
    load_layered_yaml_from_strings(&[yaml])
        .expect("test yaml must parse cleanly")
        .config_json
}

#[test]
fn live_mode_fails_when_broker_api_key_missing() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "VIGIL_SENTINEL_LIVE_APIKEY_MISSING_A1"
    api_secret: "VIGIL_SENTINEL_LIVE_APISEC_MISSING_A1"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "live");

    assert!(result.is_err(), "live must fail when broker api_key env var is not set");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("mode=live"), "error must identify live mode, got: {msg}");
    assert!(
        msg.contains("VIGIL_SENTINEL_LIVE_APIKEY_MISSING_A1"),
        "error must name the missing env var, got: {msg}"
    );
}

#[test]
fn paper_mode_fails_when_broker_api_key_missing() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "VIGIL_SENTINEL_PAPER_APIKEY_MISSING_D4"
    api_secret: "VIGIL_SENTINEL_PAPER_APISEC_MISSING_D4"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "paper");
    assert!(result.is_err(), "paper must fail when broker api_key env var is not set");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("mode=paper"), "error must identify paper mode, got: {msg}");
    assert!(
        msg.contains("VIGIL_SENTINEL_PAPER_APIKEY_MISSING_D4"),
        "error must name the missing var, got: {msg}"
    );
}

#[test]
fn dry_run_succeeds_with_no_keys_set() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "VIGIL_SENTINEL_DR_APIKEY_ABSENT_F6"
    api_secret: "VIGIL_SENTINEL_DR_APISEC_ABSENT_F6"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "dry_run");

    assert!(result.is_ok(), "dry_run must succeed when no required keys exist: {:?}", result.err());
    let secrets = result.unwrap();
    assert!(secrets.broker_api_key.is_none());
    assert!(secrets.broker_api_secret.is_none());
}

#[test]
fn unknown_mode_is_rejected() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "SOME_KEY_G7"
    api_secret: "SOME_SECRET_G7"
"#;
    let cfg = load(yaml);
    let result = resolve_secrets_for_mode(&cfg, "simulation");
    assert!(result.is_err(), "unknown mode must be rejected");
    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("simulation"), "error must echo the bad mode string, got: {msg}");
}

#[test]
fn config_json_stores_var_names_not_resolved_values() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "ALPACA_API_KEY_PAPER"
    api_secret: "ALPACA_API_SECRET_PAPER"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("must parse");
    let cfg = &loaded.config_json;

    assert_eq!(
        cfg.pointer("/broker/keys_env/api_key").and_then(|v| v.as_str()),
        Some("ALPACA_API_KEY_PAPER"),
        "config must store var NAME, not value"
    );
    assert!(!loaded.canonical_json.contains("sk-"));
}

#[test]
fn resolved_secrets_debug_output_is_redacted() {
    let yaml = r#"
broker:
  keys_env:
    api_key: "VIGIL_SENTINEL_DBG_KEY_H10"
    api_secret: "VIGIL_SENTINEL_DBG_SEC_H10"
"#;
    let cfg = load(yaml);
    let secrets = resolve_secrets_for_mode(&cfg, "dry_run").expect("dry_run must not fail");

    let debug_str = format!("{:?}", secrets);
    assert!(
        debug_str.contains("None") || debug_str.contains("REDACTED"),
        "Debug output must show None or REDACTED, got: {debug_str}"
    );
    assert!(!debug_str.contains("sk-"), "Debug must not expose secret values");
}
