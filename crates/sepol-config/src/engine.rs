use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view over the merged configuration.
///
/// Every section is optional; a missing key takes its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub host: HostSection,
    pub audit: AuditSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Report would-be changes without applying them.
    pub simulate_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Boot configuration file (default `/etc/selinux/config`).
    pub selinux_config: Option<PathBuf>,
    /// Per-tool path overrides, keyed by tool name (`semanage`, ...).
    pub tools: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Change journal location. No journal is written when unset.
    pub path: Option<PathBuf>,
    pub hash_chain: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            path: None,
            hash_chain: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing` env-filter directive, e.g. `info` or `sepol_reconcile=debug`.
    pub filter: Option<String>,
}

impl EngineConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("invalid engine configuration")
    }
}
