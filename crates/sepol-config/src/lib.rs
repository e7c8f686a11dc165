//! Layered YAML configuration for sepol.
//!
//! Layers merge in order, later wins. The merged document is converted to
//! JSON, written out canonically (sorted keys, compact) and hashed with
//! SHA-256, so a journal entry or log line can name the exact configuration
//! a run used.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

mod engine;
mod unused;

pub use engine::{AuditSection, EngineConfig, EngineSection, HostSection, LoggingSection};
pub use unused::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport, CONSUMED_POINTERS};

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Configuration with no layers: every setting at its default.
    pub fn empty() -> Result<Self> {
        load_layered_yaml_from_strings(&[])
    }

    pub fn engine(&self) -> Result<EngineConfig> {
        EngineConfig::from_config_json(&self.config_json)
    }
}

/// Read each path and merge them as layers.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        // blank layer = no overrides
        if raw.trim().is_empty() {
            continue;
        }
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        let layer = serde_json::to_value(layer).context("yaml->json conversion failed")?;
        overlay(&mut merged, layer);
    }

    // serde_json's default Map keeps keys sorted, so compact output is canonical
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    Ok(LoadedConfig {
        config_hash: sha256_hex(canonical_json.as_bytes()),
        canonical_json,
        config_json: merged,
    })
}

/// Merge `layer` into `base`: maps merge key by key, anything else replaces.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                overlay(base_map.entry(key).or_insert(Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_replaces_leaves_and_keeps_siblings() {
        let mut base = json!({"audit": {"path": "a.jsonl", "hash_chain": true}});
        overlay(&mut base, json!({"audit": {"path": "b.jsonl"}}));
        assert_eq!(base, json!({"audit": {"path": "b.jsonl", "hash_chain": true}}));
    }

    #[test]
    fn scalar_layer_replaces_a_map() {
        let mut base = json!({"host": {"tools": {"semanage": "/usr/sbin/semanage"}}});
        overlay(&mut base, json!({"host": {"tools": null}}));
        assert_eq!(base, json!({"host": {"tools": null}}));
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn bad_layer_names_its_index() {
        let err = load_layered_yaml_from_strings(&["a: 1", "a: [unclosed"]).unwrap_err();
        assert!(format!("{err:#}").contains("layer 1"));
    }
}
