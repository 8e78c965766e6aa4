//! Config hash stability
//!
//! GREEN when:
//! - Loading the same inputs twice yields an identical config_hash.
//! - Reordering keys within YAML doesn't change the hash.
//! - Different values produce different hashes.
//! - Later layers override earlier ones.
//! - Literal secrets are refused, env var names are accepted.

use cred_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
sync:
  push:
    base_url: "https://network.example.test/api"
    payer_search: "Acme Health"
    contracting_provider:
      npi: "1000000004"
      organization_name: "Example Medical Group"
    keys_env:
      api_key: "CRED_PUSH_API_KEY"
  lease:
    ttl_seconds: 3600
"#;

const BASE_YAML_REORDERED: &str = r#"
sync:
  lease:
    ttl_seconds: 3600
  push:
    keys_env:
      api_key: "CRED_PUSH_API_KEY"
    contracting_provider:
      organization_name: "Example Medical Group"
      npi: "1000000004"
    payer_search: "Acme Health"
    base_url: "https://network.example.test/api"
"#;

const OVERLAY_YAML: &str = r#"
sync:
  push:
    max_provider_operations: 40
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);

    let push = merged.sync_settings().unwrap().push.unwrap();
    assert_eq!(push.max_provider_operations, 40);
    // Untouched siblings survive the merge.
    assert_eq!(push.payer_search, "Acme Health");
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn literal_secret_is_refused() {
    let yaml = r#"
sync:
  push:
    keys_env:
      api_key: "sk-live-0123456789abcdef"
"#;
    let err = load_layered_yaml_from_strings(&[yaml]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_SECRET_DETECTED"), "got: {msg}");
    assert!(!msg.contains("0123456789abcdef"), "value must be redacted");
}
