use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Enforcement mode
// ---------------------------------------------------------------------------

/// Subsystem-wide enforcement posture.
///
/// `Disabled` can be reported by the subsystem (boot configuration) but is
/// never an accepted reconcile target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mode {
    Enforcing,
    Permissive,
    Disabled,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Enforcing => "Enforcing",
            Mode::Permissive => "Permissive",
            Mode::Disabled => "Disabled",
        }
    }

    /// Parse a requested target mode. Only `enforcing` / `permissive`
    /// (any case) are accepted.
    pub fn from_request(raw: &str) -> Option<Mode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enforcing" => Some(Mode::Enforcing),
            "permissive" => Some(Mode::Permissive),
            _ => None,
        }
    }

    /// Parse a mode as reported by `getenforce` or the `SELINUX=` key.
    pub fn from_reported(raw: &str) -> Option<Mode> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enforcing" => Some(Mode::Enforcing),
            "permissive" => Some(Mode::Permissive),
            "disabled" => Some(Mode::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Booleans
// ---------------------------------------------------------------------------

/// On/off literal used by the boolean table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, Toggle::On)
    }

    /// Lenient parse of operator input: `on/off`, `1/0`, `true/false`, `yes/no`.
    pub fn parse(raw: &str) -> Option<Toggle> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" | "yes" => Some(Toggle::On),
            "off" | "0" | "false" | "no" => Some(Toggle::Off),
            _ => None,
        }
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value {
            Toggle::On
        } else {
            Toggle::Off
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current (`State`) and boot-persisted (`Default`) value of one boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanState {
    #[serde(rename = "State")]
    pub state: Toggle,
    #[serde(rename = "Default")]
    pub default: Toggle,
}

impl BooleanState {
    pub fn new(state: Toggle, default: Toggle) -> Self {
        Self { state, default }
    }
}

// ---------------------------------------------------------------------------
// Port policies
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single port (`8080`) or an inclusive range (`8000-8010`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            low: port,
            high: port,
        }
    }

    pub fn is_single(&self) -> bool {
        self.low == self.high
    }
}

impl FromStr for PortRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse_port = |p: &str| -> Result<u16, ()> {
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(());
            }
            match p.parse::<u16>() {
                Ok(0) | Err(_) => Err(()),
                Ok(n) => Ok(n),
            }
        };
        match s.split_once('-') {
            Some((lo, hi)) => {
                let low = parse_port(lo)?;
                let high = parse_port(hi)?;
                if low > high {
                    return Err(());
                }
                Ok(Self { low, high })
            }
            None => parse_port(s).map(PortRange::single),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

impl Serialize for PortRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Binding of a protocol and port (range) to a type label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PortPolicy {
    pub sel_type: String,
    pub protocol: Protocol,
    pub port: PortRange,
}

impl PortPolicy {
    pub fn new(sel_type: impl Into<String>, protocol: Protocol, port: PortRange) -> Self {
        Self {
            sel_type: sel_type.into(),
            protocol,
            port,
        }
    }
}

/// Requested port policy, as supplied by the caller.
///
/// `protocol` / `port` may be omitted when `name` has the form
/// `protocol/port`. `sel_type` is mandatory for `present` and informational
/// for `absent`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortPolicySpec {
    pub name: String,
    pub sel_type: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<String>,
    pub sel_range: Option<String>,
}

impl PortPolicySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn sel_type(mut self, sel_type: impl Into<String>) -> Self {
        self.sel_type = Some(sel_type.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn sel_range(mut self, sel_range: impl Into<String>) -> Self {
        self.sel_range = Some(sel_range.into());
        self
    }
}

/// Result of an add/modify/delete command. `0` means success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub retcode: i32,
}

impl CommandStatus {
    pub fn ok() -> Self {
        Self { retcode: 0 }
    }

    pub fn failed(retcode: i32) -> Self {
        Self { retcode }
    }

    pub fn is_success(&self) -> bool {
        self.retcode == 0
    }
}

// ---------------------------------------------------------------------------
// File contexts
// ---------------------------------------------------------------------------

/// File type selector of a file-context rule (`semanage fcontext -f`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileType {
    All,
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Socket,
    Symlink,
    NamedPipe,
}

impl FileType {
    pub const ALL: [FileType; 8] = [
        FileType::All,
        FileType::Regular,
        FileType::Directory,
        FileType::CharDevice,
        FileType::BlockDevice,
        FileType::Socket,
        FileType::Symlink,
        FileType::NamedPipe,
    ];

    /// Single-letter id accepted by `semanage fcontext -f`.
    pub fn id(&self) -> &'static str {
        match self {
            FileType::All => "a",
            FileType::Regular => "f",
            FileType::Directory => "d",
            FileType::CharDevice => "c",
            FileType::BlockDevice => "b",
            FileType::Socket => "s",
            FileType::Symlink => "l",
            FileType::NamedPipe => "p",
        }
    }

    /// Description used by `semanage fcontext -l`.
    pub fn description(&self) -> &'static str {
        match self {
            FileType::All => "all files",
            FileType::Regular => "regular file",
            FileType::Directory => "directory",
            FileType::CharDevice => "character device",
            FileType::BlockDevice => "block device",
            FileType::Socket => "socket",
            FileType::Symlink => "symbolic link",
            FileType::NamedPipe => "named pipe",
        }
    }

    pub fn from_id(id: &str) -> Option<FileType> {
        let id = id.trim();
        Self::ALL.into_iter().find(|ft| ft.id() == id)
    }

    pub fn from_description(desc: &str) -> Option<FileType> {
        let desc = desc.trim();
        Self::ALL
            .into_iter()
            .find(|ft| ft.description().eq_ignore_ascii_case(desc))
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One file-context rule as recorded by the subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FcontextPolicy {
    pub filespec: String,
    pub filetype: FileType,
    pub sel_user: String,
    pub sel_role: String,
    pub sel_type: String,
    pub sel_level: Option<String>,
}

impl FcontextPolicy {
    pub fn new(filespec: impl Into<String>, filetype: FileType, sel_type: impl Into<String>) -> Self {
        Self {
            filespec: filespec.into(),
            filetype,
            sel_user: "system_u".to_string(),
            sel_role: "object_r".to_string(),
            sel_type: sel_type.into(),
            sel_level: Some("s0".to_string()),
        }
    }
}

/// Requested file-context rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FcontextSpec {
    pub filespec: String,
    pub filetype: FileType,
    pub sel_type: Option<String>,
    pub sel_user: Option<String>,
    pub sel_level: Option<String>,
}

impl FcontextSpec {
    pub fn new(filespec: impl Into<String>) -> Self {
        Self {
            filespec: filespec.into(),
            filetype: FileType::All,
            sel_type: None,
            sel_user: None,
            sel_level: None,
        }
    }

    pub fn filetype(mut self, filetype: FileType) -> Self {
        self.filetype = filetype;
        self
    }

    pub fn sel_type(mut self, sel_type: impl Into<String>) -> Self {
        self.sel_type = Some(sel_type.into());
        self
    }

    pub fn sel_user(mut self, sel_user: impl Into<String>) -> Self {
        self.sel_user = Some(sel_user.into());
        self
    }

    pub fn sel_level(mut self, sel_level: impl Into<String>) -> Self {
        self.sel_level = Some(sel_level.into());
        self
    }
}

/// A label rewrite, pending or applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relabel {
    pub path: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelabelReport {
    pub retcode: i32,
    pub relabeled: Vec<Relabel>,
}

// ---------------------------------------------------------------------------
// Policy modules
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    Enabled,
    Disabled,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Enabled => "Enabled",
            ModuleState::Disabled => "Disabled",
        }
    }

    /// `e*` / `1` / `on` / `true` enable, `d*` / `0` / `off` / `false` disable.
    pub fn parse(raw: &str) -> Option<ModuleState> {
        let raw = raw.trim().to_ascii_lowercase();
        match raw.as_str() {
            "1" | "on" | "true" => Some(ModuleState::Enabled),
            "0" | "off" | "false" => Some(ModuleState::Disabled),
            s if s.starts_with('e') => Some(ModuleState::Enabled),
            s if s.starts_with('d') => Some(ModuleState::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    /// `None` when the installed semodule no longer reports versions.
    pub version: Option<String>,
    pub state: ModuleState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    /// Raw requested state; validated by the reconciler.
    pub state: String,
    pub version: Option<String>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            version: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Mode,
    Boolean,
    PortPolicy,
    Fcontext,
    FcontextApplied,
    Module,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Mode => "mode",
            ResourceKind::Boolean => "boolean",
            ResourceKind::PortPolicy => "port_policy",
            ResourceKind::Fcontext => "fcontext",
            ResourceKind::FcontextApplied => "fcontext_applied",
            ResourceKind::Module => "module",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reconcile request. Exactly one resource per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DesiredState {
    Mode {
        mode: String,
    },
    Boolean {
        name: String,
        value: Option<bool>,
        persist: bool,
    },
    PortPolicyPresent(PortPolicySpec),
    PortPolicyAbsent(PortPolicySpec),
    FcontextPresent(FcontextSpec),
    FcontextAbsent(FcontextSpec),
    FcontextApplied {
        filespec: String,
        recursive: bool,
    },
    Module(ModuleSpec),
}

impl DesiredState {
    pub fn kind(&self) -> ResourceKind {
        match self {
            DesiredState::Mode { .. } => ResourceKind::Mode,
            DesiredState::Boolean { .. } => ResourceKind::Boolean,
            DesiredState::PortPolicyPresent(_) | DesiredState::PortPolicyAbsent(_) => {
                ResourceKind::PortPolicy
            }
            DesiredState::FcontextPresent(_) | DesiredState::FcontextAbsent(_) => {
                ResourceKind::Fcontext
            }
            DesiredState::FcontextApplied { .. } => ResourceKind::FcontextApplied,
            DesiredState::Module(_) => ResourceKind::Module,
        }
    }

    /// Identity reported as the outcome's `name`.
    pub fn identity(&self) -> &str {
        match self {
            DesiredState::Mode { mode } => mode,
            DesiredState::Boolean { name, .. } => name,
            DesiredState::PortPolicyPresent(spec) | DesiredState::PortPolicyAbsent(spec) => {
                &spec.name
            }
            DesiredState::FcontextPresent(spec) | DesiredState::FcontextAbsent(spec) => {
                &spec.filespec
            }
            DesiredState::FcontextApplied { filespec, .. } => filespec,
            DesiredState::Module(spec) => &spec.name,
        }
    }
}
