use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sepol_reconcile::HostError;
use tracing::debug;

/// Captured result of one child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external tools. Abstracted so the adapter can be driven by a
/// scripted runner in tests.
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, HostError>;
}

/// Blocking runner over `std::process::Command`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, HostError> {
        debug!(program = %program.display(), ?args, "exec");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| HostError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Locations of the tools and files the live adapter touches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub getenforce: PathBuf,
    pub setenforce: PathBuf,
    pub semanage: PathBuf,
    pub setsebool: PathBuf,
    pub restorecon: PathBuf,
    pub semodule: PathBuf,
    /// Boot configuration holding the `SELINUX=` key.
    pub selinux_config: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            getenforce: PathBuf::from("/usr/sbin/getenforce"),
            setenforce: PathBuf::from("/usr/sbin/setenforce"),
            semanage: PathBuf::from("/usr/sbin/semanage"),
            setsebool: PathBuf::from("/usr/sbin/setsebool"),
            restorecon: PathBuf::from("/usr/sbin/restorecon"),
            semodule: PathBuf::from("/usr/sbin/semodule"),
            selinux_config: PathBuf::from("/etc/selinux/config"),
        }
    }
}

impl ToolPaths {
    /// Override one tool by name. Returns `false` for an unknown name.
    pub fn set(&mut self, tool: &str, path: impl Into<PathBuf>) -> bool {
        let slot = match tool {
            "getenforce" => &mut self.getenforce,
            "setenforce" => &mut self.setenforce,
            "semanage" => &mut self.semanage,
            "setsebool" => &mut self.setsebool,
            "restorecon" => &mut self.restorecon,
            "semodule" => &mut self.semodule,
            _ => return false,
        };
        *slot = path.into();
        true
    }

    pub fn with_selinux_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.selinux_config = path.into();
        self
    }
}
