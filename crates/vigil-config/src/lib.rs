//! Layered YAML configuration loading, canonicalization and hashing.
//!
//! Config files are loaded in order and deep-merged (later files override
//! earlier ones), then canonicalized to a stable, key-sorted JSON
//! representation before being hashed. The hash lets a run record exactly
//! which configuration produced it, independent of incidental key ordering
//! or file layout across the layers.

pub mod consumption;
pub mod engine_config;
pub mod secrets;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use consumption::{consumed_pointers, ConfigMode};
pub use engine_config::mindset_preset_yaml;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + merge YAML files in order from disk, then canonicalize and hash.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut sources = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        sources.push(s);
    }
    let refs: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Load + merge YAML already in memory, then canonicalize and hash. Used by
/// `load_layered_yaml` and directly by tests that don't want a filesystem
/// round-trip.
pub fn load_layered_yaml_from_strings(yaml_sources: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in yaml_sources.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);
    let config_json: Value =
        serde_json::from_str(&canonical).context("canonical json parse failed")?;

    if let Some(pointer) = find_literal_secret(&config_json, String::new()) {
        bail!("CONFIG_SECRET_DETECTED: literal secret value found at '{pointer}'; store an env var NAME instead");
    }

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Deep-merge: objects merge recursively; arrays and scalars are overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON, so hashing is insensitive to source key order.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Known secret-value shapes that must never appear literally in config.
/// Config stores env var NAMES; the values themselves live only in the
/// environment. This is a best-effort net, not a cryptographic guarantee.
fn looks_like_secret(s: &str) -> bool {
    s.starts_with("sk-")
        || s.starts_with("AKIA")
        || s.contains("PRIVATE KEY")
        || s.starts_with("Bearer ")
}

fn find_literal_secret(v: &Value, path: String) -> Option<String> {
    match v {
        Value::String(s) => {
            if looks_like_secret(s) {
                Some(if path.is_empty() { "/".to_string() } else { path })
            } else {
                None
            }
        }
        Value::Object(map) => {
            for (k, val) in map {
                if let Some(p) = find_literal_secret(val, format!("{path}/{k}")) {
                    return Some(p);
                }
            }
            None
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter().enumerate() {
                if let Some(p) = find_literal_secret(val, format!("{path}/{i}")) {
                    return Some(p);
                }
            }
            None
        }
        _ => None,
    }
}

/// Whether unused config keys are merely reported or cause a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct UnusedKeysReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

fn collect_leaf_pointers(v: &Value, path: String, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, val) in map {
                collect_leaf_pointers(val, format!("{path}/{k}"), out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, val) in arr.iter().enumerate() {
                collect_leaf_pointers(val, format!("{path}/{i}"), out);
            }
        }
        _ => out.push(path),
    }
}

fn is_consumed(leaf: &str, consumed: &[&str]) -> bool {
    consumed
        .iter()
        .any(|p| leaf == *p || leaf.starts_with(&format!("{p}/")))
}

/// Diff the config's leaf pointers against the set of pointers the engine
/// actually reads in `mode`, per [`consumption::consumed_pointers`].
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeysReport> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, String::new(), &mut leaves);
    leaves.sort();

    let consumed = consumed_pointers(mode);
    let unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !is_consumed(leaf, consumed))
        .collect();

    let report = UnusedKeysReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused key(s) present: {}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.join(", ")
        );
    }

    Ok(report)
}
