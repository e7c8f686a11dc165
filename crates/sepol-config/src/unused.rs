//! Detection of config keys that no part of sepol reads.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-pointer prefixes read through [`crate::EngineConfig`]. A leaf at or
/// below one of these is consumed; every other leaf is unused.
///
/// Keep in sync with `EngineConfig`.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/engine/simulate_only",
    "/host/selinux_config",
    "/host/tools",
    "/audit/path",
    "/audit/hash_chain",
    "/logging/filter",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted, de-duplicated registry the report was computed against.
    pub consumed_prefixes: Vec<String>,
    /// Sorted pointers of leaves outside every consumed prefix.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Compare the leaves of `config_json` against [`CONSUMED_POINTERS`].
///
/// `Warn` always returns the report; `Fail` errors when anything is unused.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS.iter().map(|p| normalize(p)).collect();

    let unused: BTreeSet<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|leaf| !consumed.iter().any(|prefix| covers(prefix, leaf)))
        .collect();

    let report = UnusedKeyReport {
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let first: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. \
            Remove them or add them to CONSUMED_POINTERS. First few: {first:?}",
            report.unused_leaf_pointers.len(),
        );
    }

    Ok(report)
}

/// Leading `/`, no trailing `/` (the root stays `/`).
fn normalize(pointer: &str) -> String {
    let trimmed = pointer.trim().trim_end_matches('/');
    match trimmed.strip_prefix('/') {
        Some(rest) if !rest.is_empty() => format!("/{rest}"),
        Some(_) => "/".to_string(),
        None if trimmed.is_empty() => "/".to_string(),
        None => format!("/{trimmed}"),
    }
}

/// `/host/tools` covers `/host/tools` and `/host/tools/semanage`, not
/// `/host/toolsx`.
fn covers(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || leaf == prefix
        || leaf
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// RFC 6901 pointers of every scalar (and empty container) in `root`.
fn leaf_pointers(root: &Value) -> Vec<String> {
    let mut leaves = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];

    while let Some((at, value)) = stack.pop() {
        let children: Vec<(String, &Value)> = match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (format!("{at}/{}", k.replace('~', "~0").replace('/', "~1")), v))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("{at}/{i}"), v))
                .collect(),
            _ => Vec::new(),
        };

        if children.is_empty() {
            if !at.is_empty() {
                leaves.push(at);
            }
        } else {
            stack.extend(children);
        }
    }

    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefix_respects_segment_boundary() {
        assert!(covers("/host/tools", "/host/tools/semanage"));
        assert!(covers("/host/tools", "/host/tools"));
        assert!(!covers("/host/tools", "/host/toolsx"));
        assert!(covers("/", "/anything"));
    }

    #[test]
    fn pointers_are_normalized() {
        assert_eq!(normalize("audit/path/"), "/audit/path");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn pointer_tokens_are_escaped() {
        assert_eq!(
            leaf_pointers(&json!({"a/b": {"c~d": 1}})),
            vec!["/a~1b/c~0d".to_string()]
        );
    }

    #[test]
    fn array_items_and_empty_maps_are_leaves() {
        let mut got = leaf_pointers(&json!({"x": [true, {}], "y": {}}));
        got.sort();
        assert_eq!(got, vec!["/x/0", "/x/1", "/y"]);
    }

    #[test]
    fn empty_document_has_no_leaves() {
        let report = report_unused_keys(&json!({}), UnusedKeyPolicy::Fail).unwrap();
        assert!(report.is_clean());
    }
}
