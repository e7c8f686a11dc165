//! Result reporting: typed outcome + the `{name, changes, comment, result}`
//! record handed to callers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{Mode, ModuleState, PortPolicy, Relabel, ResourceKind, Toggle};

/// Tri-state result of one reconcile call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Converged (already, or after applying a change).
    Success,
    /// Did not converge, or the request was invalid.
    Failure,
    /// Simulate-only run in which a change would occur.
    Pending,
}

impl Status {
    /// `true` / `false` / `None` (rendered as `null`).
    pub fn as_result(&self) -> Option<bool> {
        match self {
            Status::Success => Some(true),
            Status::Failure => Some(false),
            Status::Pending => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition<T> {
    pub old: T,
    pub new: T,
}

impl<T> Transition<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }
}

/// Partial view of a file-context rule as reported in `changes`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FcontextView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sel_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sel_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sel_level: Option<String>,
}

/// Recorded change, one variant per resource kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    None,
    Mode(Transition<Mode>),
    Boolean {
        state: Transition<Toggle>,
        default: Option<Transition<Toggle>>,
    },
    PortPolicy(Transition<Option<PortPolicy>>),
    Fcontext {
        filespec: String,
        old: Option<FcontextView>,
        new: Option<FcontextView>,
    },
    Relabel(Vec<Relabel>),
    Module(Transition<ModuleState>),
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        matches!(self, Delta::None)
    }

    /// Render as the `changes` mapping. Empty object when nothing changed.
    pub fn changes(&self) -> Value {
        match self {
            Delta::None => Value::Object(Map::new()),
            Delta::Mode(t) => json!({ "old": t.old, "new": t.new }),
            Delta::Boolean { state, default } => {
                let mut m = Map::new();
                m.insert(
                    "State".to_string(),
                    json!({ "old": state.old, "new": state.new }),
                );
                if let Some(d) = default {
                    m.insert("Default".to_string(), json!({ "old": d.old, "new": d.new }));
                }
                Value::Object(m)
            }
            Delta::PortPolicy(t) => json!({ "old": t.old, "new": t.new }),
            Delta::Fcontext { filespec, old, new } => {
                let side = |view: &Option<FcontextView>| {
                    let mut m = Map::new();
                    if let Some(v) = view {
                        m.insert(filespec.clone(), json!(v));
                    }
                    Value::Object(m)
                };
                json!({ "old": side(old), "new": side(new) })
            }
            Delta::Relabel(items) => json!({ "relabeled": items }),
            Delta::Module(t) => json!({ "old": t.old, "new": t.new }),
        }
    }
}

/// Outcome of one reconcile call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub kind: ResourceKind,
    pub identity: String,
    pub delta: Delta,
    pub narrative: String,
    pub status: Status,
}

impl Outcome {
    fn build(
        kind: ResourceKind,
        identity: &str,
        status: Status,
        narrative: impl Into<String>,
        delta: Delta,
    ) -> Self {
        Self {
            kind,
            identity: identity.to_string(),
            delta,
            narrative: narrative.into(),
            status,
        }
    }

    /// Already in the requested state. Nothing was changed.
    pub fn converged(kind: ResourceKind, identity: &str, narrative: impl Into<String>) -> Self {
        Self::build(kind, identity, Status::Success, narrative, Delta::None)
    }

    /// Simulate-only: a change would occur.
    pub fn pending(
        kind: ResourceKind,
        identity: &str,
        narrative: impl Into<String>,
        delta: Delta,
    ) -> Self {
        Self::build(kind, identity, Status::Pending, narrative, delta)
    }

    /// A change was applied and verified.
    pub fn changed(
        kind: ResourceKind,
        identity: &str,
        narrative: impl Into<String>,
        delta: Delta,
    ) -> Self {
        Self::build(kind, identity, Status::Success, narrative, delta)
    }

    pub fn failed(kind: ResourceKind, identity: &str, narrative: impl Into<String>) -> Self {
        Self::build(kind, identity, Status::Failure, narrative, Delta::None)
    }

    /// A port-policy command returned a non-zero code.
    ///
    /// Compatibility quirk: callers of the port-policy states have always
    /// received `result: true` here, with only the comment carrying the
    /// error. Kept as-is; see `scenario_port_policy_retcode_quirk`.
    pub fn tolerated_adapter_error(
        kind: ResourceKind,
        identity: &str,
        narrative: impl Into<String>,
    ) -> Self {
        Self::build(kind, identity, Status::Success, narrative, Delta::None)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Failure
    }

    pub fn record(&self) -> OutcomeRecord {
        OutcomeRecord {
            name: self.identity.clone(),
            changes: self.delta.changes(),
            comment: self.narrative.clone(),
            result: self.status.as_result(),
        }
    }
}

/// Wire shape consumed by orchestrators: `{name, changes, comment, result}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub name: String,
    pub changes: Value,
    pub comment: String,
    pub result: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PortRange, Protocol};

    #[test]
    fn status_maps_to_tri_state() {
        assert_eq!(Status::Success.as_result(), Some(true));
        assert_eq!(Status::Failure.as_result(), Some(false));
        assert_eq!(Status::Pending.as_result(), None);
    }

    #[test]
    fn empty_delta_renders_empty_object() {
        let o = Outcome::converged(ResourceKind::Mode, "Enforcing", "x");
        let rec = o.record();
        assert_eq!(rec.changes, json!({}));
        assert_eq!(serde_json::to_value(&rec).unwrap()["result"], json!(true));
    }

    #[test]
    fn pending_record_has_null_result() {
        let o = Outcome::pending(ResourceKind::Boolean, "b", "", Delta::None);
        let v = serde_json::to_value(o.record()).unwrap();
        assert!(v["result"].is_null());
    }

    #[test]
    fn boolean_delta_uses_state_and_default_keys() {
        let d = Delta::Boolean {
            state: Transition::new(Toggle::Off, Toggle::On),
            default: Some(Transition::new(Toggle::Off, Toggle::On)),
        };
        assert_eq!(
            d.changes(),
            json!({
                "State": {"old": "off", "new": "on"},
                "Default": {"old": "off", "new": "on"},
            })
        );
    }

    #[test]
    fn port_delta_renders_null_side() {
        let p = PortPolicy::new("http_port_t", Protocol::Tcp, PortRange::single(80));
        let d = Delta::PortPolicy(Transition::new(None, Some(p)));
        assert_eq!(
            d.changes(),
            json!({
                "old": null,
                "new": {"sel_type": "http_port_t", "protocol": "tcp", "port": "80"},
            })
        );
    }

    #[test]
    fn fcontext_delta_is_keyed_by_filespec() {
        let d = Delta::Fcontext {
            filespec: "/srv/www(/.*)?".to_string(),
            old: None,
            new: Some(FcontextView {
                filetype: Some("all files".to_string()),
                sel_type: Some("httpd_sys_content_t".to_string()),
                ..FcontextView::default()
            }),
        };
        assert_eq!(
            d.changes(),
            json!({
                "old": {},
                "new": {"/srv/www(/.*)?": {"filetype": "all files", "sel_type": "httpd_sys_content_t"}},
            })
        );
    }

    #[test]
    fn mode_delta_uses_canonical_names() {
        let d = Delta::Mode(Transition::new(Mode::Enforcing, Mode::Permissive));
        assert_eq!(d.changes(), json!({"old": "Enforcing", "new": "Permissive"}));
    }
}
