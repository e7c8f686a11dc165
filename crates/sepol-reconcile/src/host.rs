//! Adapter boundary: the capability set the reconcilers consume.
//!
//! Adapters validate and type the subsystem's output once, here at the
//! boundary. The reconcilers never see raw tool text.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::{
    BooleanState, CommandStatus, FcontextPolicy, FileType, Mode, ModuleInfo, ModuleState,
    PortPolicy, PortRange, Protocol, Relabel, RelabelReport, Toggle,
};

/// Failure to talk to the managed subsystem at all (as opposed to a command
/// that ran and reported a non-zero status).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{tool} is not available: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("unexpected output from {tool}: {detail}")]
    Parse { tool: String, detail: String },

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read side. Implementations must not mutate the subsystem.
pub trait StateQuery {
    /// Live enforcement mode.
    fn get_mode(&self) -> Result<Mode, HostError>;

    /// Mode the subsystem will boot into.
    fn get_configured_mode(&self) -> Result<Mode, HostError>;

    fn list_booleans(&self) -> Result<BTreeMap<String, BooleanState>, HostError>;

    fn get_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<Option<PortPolicy>, HostError>;

    fn get_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<Option<FcontextPolicy>, HostError>;

    /// Labels that a relabel of `filespec` would rewrite.
    fn pending_relabels(
        &self,
        filespec: &str,
        recursive: bool,
    ) -> Result<Vec<Relabel>, HostError>;

    fn list_modules(&self) -> Result<BTreeMap<String, ModuleInfo>, HostError>;
}

/// Write side. One call applies exactly one change.
pub trait StateMutation {
    /// Apply `mode` (live and boot configuration) and return the live mode
    /// now in effect.
    fn set_mode(&self, mode: Mode) -> Result<Mode, HostError>;

    /// `Ok(false)` when the tool ran but refused the change.
    fn set_boolean(&self, name: &str, value: Toggle, persist: bool) -> Result<bool, HostError>;

    fn add_port_policy(
        &self,
        policy: &PortPolicy,
        sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError>;

    fn modify_port_policy(
        &self,
        policy: &PortPolicy,
        sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError>;

    fn delete_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<CommandStatus, HostError>;

    fn add_fcontext_policy(&self, policy: &FcontextPolicy) -> Result<CommandStatus, HostError>;

    fn modify_fcontext_policy(&self, policy: &FcontextPolicy)
        -> Result<CommandStatus, HostError>;

    fn delete_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<CommandStatus, HostError>;

    fn apply_relabels(&self, filespec: &str, recursive: bool) -> Result<RelabelReport, HostError>;

    fn set_module(&self, name: &str, state: ModuleState) -> Result<bool, HostError>;
}

/// Full capability set injected into [`crate::Reconciler`].
pub trait SelinuxHost: StateQuery + StateMutation {}

impl<T: StateQuery + StateMutation + ?Sized> SelinuxHost for T {}
