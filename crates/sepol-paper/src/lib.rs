//! Deterministic in-memory "paper" SELinux host.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - All state lives in ordered maps; listings are stable.
//! - A live mode of `None` models a host without a working `getenforce`;
//!   `get_mode` then errors and callers fall back to the configured mode.
//! - File labels are plain type names (`httpd_sys_content_t`). A rule whose
//!   filespec ends in `(/.*)?` also covers everything below its base path;
//!   the longest matching base wins.
//! - Adding an existing port/fcontext rule, or modifying/deleting a missing
//!   one, returns retcode 1 like the real tool.
//! - Faults are opt-in builder switches. No randomness.
//!
//! Every call is recorded (`query:<op>` / `mutate:<op>`) so tests can assert
//! that simulate-only runs never reach the mutation side.

use std::cell::RefCell;
use std::collections::BTreeMap;

use sepol_reconcile::{
    BooleanState, CommandStatus, FcontextPolicy, FileType, HostError, Mode, ModuleInfo,
    ModuleState, PortPolicy, PortRange, Protocol, Relabel, RelabelReport, StateMutation,
    StateQuery, Toggle,
};

const SUBTREE_SUFFIX: &str = "(/.*)?";

#[derive(Clone, Debug, Default)]
struct PaperState {
    live_mode: Option<Mode>,
    configured_mode: Option<Mode>,
    booleans: BTreeMap<String, BooleanState>,
    ports: BTreeMap<(Protocol, PortRange), PortPolicy>,
    fcontexts: BTreeMap<(String, FileType), FcontextPolicy>,
    files: BTreeMap<String, String>,
    modules: BTreeMap<String, ModuleInfo>,
}

#[derive(Clone, Debug, Default)]
struct Faults {
    queries_unavailable: bool,
    mode_sticky: bool,
    boolean_writes_refused: bool,
    port_retcode: Option<i32>,
    fcontext_retcode: Option<i32>,
    relabel_retcode: Option<i32>,
    module_writes_refused: bool,
}

#[derive(Debug, Default)]
pub struct PaperHost {
    state: RefCell<PaperState>,
    faults: Faults,
    calls: RefCell<Vec<String>>,
}

/// Split a filespec into its base path and whether it covers the subtree.
fn split_filespec(filespec: &str) -> (&str, bool) {
    match filespec.strip_suffix(SUBTREE_SUFFIX) {
        Some(base) => (base, true),
        None => (filespec, false),
    }
}

fn covers(base: &str, subtree: bool, path: &str) -> bool {
    path == base || (subtree && path.starts_with(&format!("{}/", base.trim_end_matches('/'))))
}

impl PaperState {
    fn expected_label(&self, path: &str) -> Option<&str> {
        self.fcontexts
            .values()
            .filter_map(|rule| {
                let (base, subtree) = split_filespec(&rule.filespec);
                covers(base, subtree, path).then_some((base.len(), rule.sel_type.as_str()))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, sel_type)| sel_type)
    }

    fn pending(&self, filespec: &str, recursive: bool) -> Vec<Relabel> {
        let (base, subtree) = split_filespec(filespec);
        self.files
            .iter()
            .filter(|(path, _)| covers(base, recursive || subtree, path))
            .filter_map(|(path, label)| {
                let want = self.expected_label(path)?;
                (want != label).then(|| Relabel {
                    path: path.clone(),
                    from: label.clone(),
                    to: want.to_string(),
                })
            })
            .collect()
    }
}

impl PaperHost {
    /// Enforcing, live and configured; nothing else defined.
    pub fn new() -> Self {
        Self::default().with_mode(Mode::Enforcing)
    }

    // -- state setup ------------------------------------------------------

    /// Set both the live and the configured mode.
    pub fn with_mode(self, mode: Mode) -> Self {
        self.with_live_mode(mode).with_configured_mode(mode)
    }

    pub fn with_live_mode(self, mode: Mode) -> Self {
        self.state.borrow_mut().live_mode = Some(mode);
        self
    }

    pub fn with_configured_mode(self, mode: Mode) -> Self {
        self.state.borrow_mut().configured_mode = Some(mode);
        self
    }

    /// Host whose live getter is unavailable (configured mode still readable).
    pub fn without_live_mode(self) -> Self {
        self.state.borrow_mut().live_mode = None;
        self
    }

    pub fn with_boolean(self, name: &str, state: Toggle, default: Toggle) -> Self {
        self.state
            .borrow_mut()
            .booleans
            .insert(name.to_string(), BooleanState::new(state, default));
        self
    }

    pub fn with_port_policy(self, policy: PortPolicy) -> Self {
        self.state
            .borrow_mut()
            .ports
            .insert((policy.protocol, policy.port), policy);
        self
    }

    pub fn with_fcontext(self, policy: FcontextPolicy) -> Self {
        self.state
            .borrow_mut()
            .fcontexts
            .insert((policy.filespec.clone(), policy.filetype), policy);
        self
    }

    /// A file on disk carrying `label` (a type name).
    pub fn with_file(self, path: &str, label: &str) -> Self {
        self.state
            .borrow_mut()
            .files
            .insert(path.to_string(), label.to_string());
        self
    }

    pub fn with_module(self, name: &str, version: Option<&str>, state: ModuleState) -> Self {
        self.state.borrow_mut().modules.insert(
            name.to_string(),
            ModuleInfo {
                version: version.map(str::to_string),
                state,
            },
        );
        self
    }

    // -- faults -----------------------------------------------------------

    /// Every query errors with `HostError::Unavailable`.
    pub fn with_queries_unavailable(mut self) -> Self {
        self.faults.queries_unavailable = true;
        self
    }

    /// `set_mode` is accepted but the live mode does not change.
    pub fn reject_mode_changes(mut self) -> Self {
        self.faults.mode_sticky = true;
        self
    }

    pub fn fail_boolean_writes(mut self) -> Self {
        self.faults.boolean_writes_refused = true;
        self
    }

    /// Port add/modify/delete return `retcode` without changing anything.
    pub fn with_port_retcode(mut self, retcode: i32) -> Self {
        self.faults.port_retcode = Some(retcode);
        self
    }

    pub fn with_fcontext_retcode(mut self, retcode: i32) -> Self {
        self.faults.fcontext_retcode = Some(retcode);
        self
    }

    pub fn with_relabel_retcode(mut self, retcode: i32) -> Self {
        self.faults.relabel_retcode = Some(retcode);
        self
    }

    pub fn fail_module_writes(mut self) -> Self {
        self.faults.module_writes_refused = true;
        self
    }

    // -- inspection -------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn query_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("query:"))
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutation_log().len()
    }

    pub fn mutation_log(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("mutate:"))
            .cloned()
            .collect()
    }

    pub fn live_mode(&self) -> Option<Mode> {
        self.state.borrow().live_mode
    }

    pub fn configured_mode(&self) -> Option<Mode> {
        self.state.borrow().configured_mode
    }

    pub fn boolean(&self, name: &str) -> Option<BooleanState> {
        self.state.borrow().booleans.get(name).copied()
    }

    pub fn port_policy(&self, protocol: Protocol, port: PortRange) -> Option<PortPolicy> {
        self.state.borrow().ports.get(&(protocol, port)).cloned()
    }

    pub fn fcontext(&self, filespec: &str, filetype: FileType) -> Option<FcontextPolicy> {
        self.state
            .borrow()
            .fcontexts
            .get(&(filespec.to_string(), filetype))
            .cloned()
    }

    pub fn file_label(&self, path: &str) -> Option<String> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn module(&self, name: &str) -> Option<ModuleInfo> {
        self.state.borrow().modules.get(name).cloned()
    }

    // -- internals --------------------------------------------------------

    fn query(&self, op: &str) -> Result<(), HostError> {
        self.calls.borrow_mut().push(format!("query:{op}"));
        if self.faults.queries_unavailable {
            return Err(HostError::Unavailable {
                tool: op.to_string(),
                reason: "paper host configured without queries".to_string(),
            });
        }
        Ok(())
    }

    fn mutate(&self, op: &str) {
        self.calls.borrow_mut().push(format!("mutate:{op}"));
    }
}

impl StateQuery for PaperHost {
    fn get_mode(&self) -> Result<Mode, HostError> {
        self.query("get_mode")?;
        self.state
            .borrow()
            .live_mode
            .ok_or_else(|| HostError::Unavailable {
                tool: "getenforce".to_string(),
                reason: "no live mode".to_string(),
            })
    }

    fn get_configured_mode(&self) -> Result<Mode, HostError> {
        self.query("get_configured_mode")?;
        self.state
            .borrow()
            .configured_mode
            .ok_or_else(|| HostError::Unavailable {
                tool: "selinux config".to_string(),
                reason: "no configured mode".to_string(),
            })
    }

    fn list_booleans(&self) -> Result<BTreeMap<String, BooleanState>, HostError> {
        self.query("list_booleans")?;
        Ok(self.state.borrow().booleans.clone())
    }

    fn get_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<Option<PortPolicy>, HostError> {
        self.query("get_port_policy")?;
        Ok(self.port_policy(protocol, port))
    }

    fn get_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<Option<FcontextPolicy>, HostError> {
        self.query("get_fcontext_policy")?;
        Ok(self.fcontext(filespec, filetype))
    }

    fn pending_relabels(&self, filespec: &str, recursive: bool) -> Result<Vec<Relabel>, HostError> {
        self.query("pending_relabels")?;
        Ok(self.state.borrow().pending(filespec, recursive))
    }

    fn list_modules(&self) -> Result<BTreeMap<String, ModuleInfo>, HostError> {
        self.query("list_modules")?;
        Ok(self.state.borrow().modules.clone())
    }
}

impl StateMutation for PaperHost {
    fn set_mode(&self, mode: Mode) -> Result<Mode, HostError> {
        self.mutate("set_mode");
        let mut st = self.state.borrow_mut();
        if !self.faults.mode_sticky {
            st.configured_mode = Some(mode);
            if st.live_mode.is_some() {
                st.live_mode = Some(mode);
            }
        }
        st.live_mode
            .or(st.configured_mode)
            .ok_or_else(|| HostError::Unavailable {
                tool: "setenforce".to_string(),
                reason: "no mode to report".to_string(),
            })
    }

    fn set_boolean(&self, name: &str, value: Toggle, persist: bool) -> Result<bool, HostError> {
        self.mutate("set_boolean");
        if self.faults.boolean_writes_refused {
            return Ok(false);
        }
        let mut st = self.state.borrow_mut();
        let Some(entry) = st.booleans.get_mut(name) else {
            return Ok(false);
        };
        entry.state = value;
        if persist {
            entry.default = value;
        }
        Ok(true)
    }

    fn add_port_policy(
        &self,
        policy: &PortPolicy,
        _sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError> {
        self.mutate("add_port_policy");
        if let Some(code) = self.faults.port_retcode {
            return Ok(CommandStatus::failed(code));
        }
        let mut st = self.state.borrow_mut();
        let key = (policy.protocol, policy.port);
        if st.ports.contains_key(&key) {
            return Ok(CommandStatus::failed(1));
        }
        st.ports.insert(key, policy.clone());
        Ok(CommandStatus::ok())
    }

    fn modify_port_policy(
        &self,
        policy: &PortPolicy,
        _sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError> {
        self.mutate("modify_port_policy");
        if let Some(code) = self.faults.port_retcode {
            return Ok(CommandStatus::failed(code));
        }
        let mut st = self.state.borrow_mut();
        match st.ports.get_mut(&(policy.protocol, policy.port)) {
            Some(existing) => {
                *existing = policy.clone();
                Ok(CommandStatus::ok())
            }
            None => Ok(CommandStatus::failed(1)),
        }
    }

    fn delete_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<CommandStatus, HostError> {
        self.mutate("delete_port_policy");
        if let Some(code) = self.faults.port_retcode {
            return Ok(CommandStatus::failed(code));
        }
        match self.state.borrow_mut().ports.remove(&(protocol, port)) {
            Some(_) => Ok(CommandStatus::ok()),
            None => Ok(CommandStatus::failed(1)),
        }
    }

    fn add_fcontext_policy(&self, policy: &FcontextPolicy) -> Result<CommandStatus, HostError> {
        self.mutate("add_fcontext_policy");
        if let Some(code) = self.faults.fcontext_retcode {
            return Ok(CommandStatus::failed(code));
        }
        let mut st = self.state.borrow_mut();
        let key = (policy.filespec.clone(), policy.filetype);
        if st.fcontexts.contains_key(&key) {
            return Ok(CommandStatus::failed(1));
        }
        st.fcontexts.insert(key, policy.clone());
        Ok(CommandStatus::ok())
    }

    fn modify_fcontext_policy(&self, policy: &FcontextPolicy) -> Result<CommandStatus, HostError> {
        self.mutate("modify_fcontext_policy");
        if let Some(code) = self.faults.fcontext_retcode {
            return Ok(CommandStatus::failed(code));
        }
        let mut st = self.state.borrow_mut();
        match st
            .fcontexts
            .get_mut(&(policy.filespec.clone(), policy.filetype))
        {
            Some(existing) => {
                *existing = policy.clone();
                Ok(CommandStatus::ok())
            }
            None => Ok(CommandStatus::failed(1)),
        }
    }

    fn delete_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<CommandStatus, HostError> {
        self.mutate("delete_fcontext_policy");
        if let Some(code) = self.faults.fcontext_retcode {
            return Ok(CommandStatus::failed(code));
        }
        let removed = self
            .state
            .borrow_mut()
            .fcontexts
            .remove(&(filespec.to_string(), filetype));
        Ok(match removed {
            Some(_) => CommandStatus::ok(),
            None => CommandStatus::failed(1),
        })
    }

    fn apply_relabels(&self, filespec: &str, recursive: bool) -> Result<RelabelReport, HostError> {
        self.mutate("apply_relabels");
        if let Some(retcode) = self.faults.relabel_retcode {
            return Ok(RelabelReport {
                retcode,
                relabeled: Vec::new(),
            });
        }
        let mut st = self.state.borrow_mut();
        let relabeled = st.pending(filespec, recursive);
        for item in &relabeled {
            st.files.insert(item.path.clone(), item.to.clone());
        }
        Ok(RelabelReport {
            retcode: 0,
            relabeled,
        })
    }

    fn set_module(&self, name: &str, state: ModuleState) -> Result<bool, HostError> {
        self.mutate("set_module");
        if self.faults.module_writes_refused {
            return Ok(false);
        }
        match self.state.borrow_mut().modules.get_mut(name) {
            Some(info) => {
                info.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Convenience constructors for common values used by tests.
pub fn tcp(sel_type: &str, port: u16) -> PortPolicy {
    PortPolicy::new(sel_type, Protocol::Tcp, PortRange::single(port))
}

pub fn udp(sel_type: &str, port: u16) -> PortPolicy {
    PortPolicy::new(sel_type, Protocol::Udp, PortRange::single(port))
}
