//! Live SELinux host backed by the policycoreutils command-line tools.
//!
//! `SemanageHost` implements the reconciler's capability set by shelling out
//! to `getenforce`, `setenforce`, `setsebool`, `semanage`, `restorecon` and
//! `semodule`, and by editing the boot configuration file. Tool output is
//! parsed once here (see [`parse`]) so the reconcilers only ever see typed
//! values.
//!
//! Query tools that exit non-zero are errors ([`HostError::CommandFailed`]);
//! mutation tools report their exit code as a [`CommandStatus`] and leave
//! the interpretation to the reconciler.

use std::collections::BTreeMap;
use std::path::Path;

use sepol_reconcile::{
    BooleanState, CommandStatus, FcontextPolicy, FileType, HostError, Mode, ModuleInfo,
    ModuleState, PortPolicy, PortRange, Protocol, Relabel, RelabelReport, StateMutation,
    StateQuery, Toggle,
};
use tracing::{debug, warn};

pub mod parse;
mod runner;

pub use runner::{CommandOutput, CommandRunner, SystemRunner, ToolPaths};

const SUBTREE_SUFFIX: &str = "(/.*)?";

pub struct SemanageHost<R: CommandRunner = SystemRunner> {
    runner: R,
    paths: ToolPaths,
}

impl SemanageHost<SystemRunner> {
    pub fn system(paths: ToolPaths) -> Self {
        Self::new(SystemRunner, paths)
    }
}

impl<R: CommandRunner> SemanageHost<R> {
    pub fn new(runner: R, paths: ToolPaths) -> Self {
        Self { runner, paths }
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn exec(&self, program: &Path, args: &[&str]) -> Result<CommandOutput, HostError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(program, &args)
    }

    /// Run a read-only tool and return its stdout; non-zero exit is an error.
    fn query(&self, program: &Path, args: &[&str]) -> Result<String, HostError> {
        let out = self.exec(program, args)?;
        if !out.success() {
            return Err(HostError::CommandFailed {
                program: program.display().to_string(),
                status: out.status,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    fn status(&self, program: &Path, args: &[&str]) -> Result<CommandStatus, HostError> {
        let out = self.exec(program, args)?;
        if !out.success() {
            warn!(
                program = %program.display(),
                status = out.status,
                stderr = out.stderr.trim(),
                "command exited non-zero"
            );
        }
        Ok(CommandStatus {
            retcode: out.status,
        })
    }

    fn read_config(&self) -> Result<String, HostError> {
        let path = &self.paths.selinux_config;
        std::fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.clone(),
            source,
        })
    }

    fn write_config_mode(&self, mode: Mode) -> Result<(), HostError> {
        let path = &self.paths.selinux_config;
        let contents = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(HostError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };
        std::fs::write(path, parse::rewrite_config_mode(&contents, mode)).map_err(|source| {
            HostError::Io {
                path: path.clone(),
                source,
            }
        })
    }

    fn semanage(&self, args: &[&str]) -> Result<CommandStatus, HostError> {
        self.status(&self.paths.semanage, args)
    }

    fn port_args<'a>(
        op: &'a str,
        policy: &'a PortPolicy,
        port: &'a str,
        sel_range: Option<&'a str>,
    ) -> Vec<&'a str> {
        let mut args = vec!["port", op, "-t", policy.sel_type.as_str()];
        if let Some(range) = sel_range {
            args.extend(["-r", range]);
        }
        args.extend(["-p", policy.protocol.as_str(), port]);
        args
    }

    fn fcontext_args<'a>(op: &'a str, policy: &'a FcontextPolicy) -> Vec<&'a str> {
        let mut args = vec![
            "fcontext",
            op,
            "-f",
            policy.filetype.id(),
            "-t",
            policy.sel_type.as_str(),
            "-s",
            policy.sel_user.as_str(),
        ];
        if let Some(level) = policy.sel_level.as_deref() {
            args.extend(["-r", level]);
        }
        args.push(policy.filespec.as_str());
        args
    }
}

/// A filespec regex covering a subtree is checked as its base path,
/// recursively.
fn relabel_target(filespec: &str, recursive: bool) -> (&str, bool) {
    match filespec.strip_suffix(SUBTREE_SUFFIX) {
        Some(base) => (base, true),
        None => (filespec, recursive),
    }
}

impl<R: CommandRunner> StateQuery for SemanageHost<R> {
    fn get_mode(&self) -> Result<Mode, HostError> {
        let out = self.query(&self.paths.getenforce, &[])?;
        parse::getenforce(&out)
    }

    fn get_configured_mode(&self) -> Result<Mode, HostError> {
        parse::config_mode(&self.read_config()?)
    }

    fn list_booleans(&self) -> Result<BTreeMap<String, BooleanState>, HostError> {
        let out = self.query(&self.paths.semanage, &["boolean", "-l"])?;
        Ok(parse::booleans(&out))
    }

    fn get_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<Option<PortPolicy>, HostError> {
        // `-l` sorts by type, so a port moved by `-m` shows under both its
        // policy type and its local one; the local listing decides
        let local = self.query(&self.paths.semanage, &["port", "-l", "-C"])?;
        if let Some(policy) = parse::find_port(&local, protocol, port) {
            return Ok(Some(policy));
        }
        let all = self.query(&self.paths.semanage, &["port", "-l"])?;
        Ok(parse::find_port(&all, protocol, port))
    }

    fn get_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<Option<FcontextPolicy>, HostError> {
        let out = self.query(&self.paths.semanage, &["fcontext", "-l"])?;
        Ok(parse::fcontext_rows(&out)
            .into_iter()
            .find(|r| r.filespec == filespec && r.filetype == filetype))
    }

    fn pending_relabels(&self, filespec: &str, recursive: bool) -> Result<Vec<Relabel>, HostError> {
        let (path, recursive) = relabel_target(filespec, recursive);
        let mut args = vec!["-n", "-v"];
        if recursive {
            args.push("-R");
        }
        args.push(path);
        let out = self.query(&self.paths.restorecon, &args)?;
        Ok(parse::relabels(&out))
    }

    fn list_modules(&self) -> Result<BTreeMap<String, ModuleInfo>, HostError> {
        // semodule < 2.4 has no --list-modules; fall back to -l
        let out = match self.query(&self.paths.semodule, &["--list-modules=full"]) {
            Ok(out) => out,
            Err(HostError::CommandFailed { .. }) => {
                debug!("semodule without --list-modules, using -l");
                self.query(&self.paths.semodule, &["-l"])?
            }
            Err(err) => return Err(err),
        };
        Ok(parse::modules(&out))
    }
}

impl<R: CommandRunner> StateMutation for SemanageHost<R> {
    fn set_mode(&self, mode: Mode) -> Result<Mode, HostError> {
        let flag = match mode {
            Mode::Enforcing => Some("1"),
            Mode::Permissive => Some("0"),
            Mode::Disabled => None,
        };
        if let Some(flag) = flag {
            // fails on a host booted with SELinux disabled; the config
            // change still takes effect on the next boot
            let status = self.status(&self.paths.setenforce, &[flag])?;
            if !status.is_success() {
                debug!(retcode = status.retcode, "setenforce refused");
            }
        }
        self.write_config_mode(mode)?;
        self.get_mode().or_else(|err| {
            debug!(error = %err, "getenforce unavailable after set, reading config");
            self.get_configured_mode()
        })
    }

    fn set_boolean(&self, name: &str, value: Toggle, persist: bool) -> Result<bool, HostError> {
        let mut args = Vec::with_capacity(3);
        if persist {
            args.push("-P");
        }
        args.extend([name, value.as_str()]);
        Ok(self.status(&self.paths.setsebool, &args)?.is_success())
    }

    fn add_port_policy(
        &self,
        policy: &PortPolicy,
        sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError> {
        let port = policy.port.to_string();
        self.semanage(&Self::port_args("-a", policy, &port, sel_range))
    }

    fn modify_port_policy(
        &self,
        policy: &PortPolicy,
        sel_range: Option<&str>,
    ) -> Result<CommandStatus, HostError> {
        let port = policy.port.to_string();
        self.semanage(&Self::port_args("-m", policy, &port, sel_range))
    }

    fn delete_port_policy(
        &self,
        protocol: Protocol,
        port: PortRange,
    ) -> Result<CommandStatus, HostError> {
        let port = port.to_string();
        self.semanage(&["port", "-d", "-p", protocol.as_str(), &port])
    }

    fn add_fcontext_policy(&self, policy: &FcontextPolicy) -> Result<CommandStatus, HostError> {
        self.semanage(&Self::fcontext_args("-a", policy))
    }

    fn modify_fcontext_policy(&self, policy: &FcontextPolicy) -> Result<CommandStatus, HostError> {
        self.semanage(&Self::fcontext_args("-m", policy))
    }

    fn delete_fcontext_policy(
        &self,
        filespec: &str,
        filetype: FileType,
    ) -> Result<CommandStatus, HostError> {
        self.semanage(&["fcontext", "-d", "-f", filetype.id(), filespec])
    }

    fn apply_relabels(&self, filespec: &str, recursive: bool) -> Result<RelabelReport, HostError> {
        let (path, recursive) = relabel_target(filespec, recursive);
        let mut args = vec!["-v"];
        if recursive {
            args.push("-R");
        }
        args.push(path);
        let out = self.exec(&self.paths.restorecon, &args)?;
        Ok(RelabelReport {
            retcode: out.status,
            relabeled: parse::relabels(&out.stdout),
        })
    }

    fn set_module(&self, name: &str, state: ModuleState) -> Result<bool, HostError> {
        let flag = match state {
            ModuleState::Enabled => "-e",
            ModuleState::Disabled => "-d",
        };
        Ok(self.status(&self.paths.semodule, &[flag, name])?.is_success())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;

    use super::*;

    /// Replays canned outputs in order and records every argv.
    #[derive(Default)]
    struct ScriptedRunner {
        replies: RefCell<VecDeque<CommandOutput>>,
        seen: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn reply(self, status: i32, stdout: &str) -> Self {
            self.replies.borrow_mut().push_back(CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: if status == 0 { String::new() } else { "boom".to_string() },
            });
            self
        }

        fn argv(&self, i: usize) -> Vec<String> {
            self.seen.borrow()[i].clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, HostError> {
            let name = program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut argv = vec![name];
            argv.extend(args.iter().cloned());
            self.seen.borrow_mut().push(argv);
            Ok(self.replies.borrow_mut().pop_front().unwrap_or_default())
        }
    }

    fn host(runner: ScriptedRunner) -> SemanageHost<ScriptedRunner> {
        SemanageHost::new(runner, ToolPaths::default())
    }

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn failed_query_is_an_error() {
        let h = host(ScriptedRunner::default().reply(1, ""));
        let err = h.list_booleans().unwrap_err();
        assert!(matches!(err, HostError::CommandFailed { status: 1, .. }));
    }

    #[test]
    fn port_lookup_and_add_args() {
        let h = host(
            ScriptedRunner::default()
                .reply(0, "")
                .reply(0, "http_port_t  tcp  80, 443\n")
                .reply(0, ""),
        );
        let p = h
            .get_port_policy(Protocol::Tcp, PortRange::single(443))
            .unwrap()
            .unwrap();
        assert_eq!(p.sel_type, "http_port_t");

        let status = h
            .add_port_policy(
                &PortPolicy::new("http_port_t", Protocol::Tcp, PortRange::single(8080)),
                Some("s0"),
            )
            .unwrap();
        assert!(status.is_success());
        assert_eq!(h.runner().argv(0), strs(&["semanage", "port", "-l", "-C"]));
        assert_eq!(h.runner().argv(1), strs(&["semanage", "port", "-l"]));
        assert_eq!(
            h.runner().argv(2),
            strs(&["semanage", "port", "-a", "-t", "http_port_t", "-r", "s0", "-p", "tcp", "8080"])
        );
    }

    #[test]
    fn local_port_customization_wins_over_policy_default() {
        let local = "SELinux Port Type              Proto    Port Number\n\n\
                     http_port_t                    tcp      8080\n";
        let full = "SELinux Port Type              Proto    Port Number\n\n\
                    http_cache_port_t              tcp      8080, 8118, 8123, 10001-10010\n\
                    http_port_t                    tcp      8080, 80, 81, 443, 488, 8008, 8009, 8443, 9000\n";
        let h = host(ScriptedRunner::default().reply(0, local).reply(0, full));

        let p = h
            .get_port_policy(Protocol::Tcp, PortRange::single(8080))
            .unwrap()
            .unwrap();
        assert_eq!(p.sel_type, "http_port_t");
        assert_eq!(h.runner().seen.borrow().len(), 1, "full listing not needed");
    }

    #[test]
    fn policy_default_used_when_no_local_row() {
        let local = "http_port_t  tcp  8080\n";
        let full = "http_cache_port_t  tcp  8080, 8118\n\
                    http_port_t        tcp  8080, 80, 443\n\
                    ssh_port_t         tcp  22\n";
        let h = host(ScriptedRunner::default().reply(0, local).reply(0, full));

        let p = h
            .get_port_policy(Protocol::Tcp, PortRange::single(22))
            .unwrap()
            .unwrap();
        assert_eq!(p.sel_type, "ssh_port_t");
        assert_eq!(h.runner().argv(1), strs(&["semanage", "port", "-l"]));
    }

    #[test]
    fn mutation_exit_code_is_reported_not_raised() {
        let h = host(ScriptedRunner::default().reply(1, ""));
        let status = h
            .delete_port_policy(Protocol::Udp, "6000-6010".parse().unwrap())
            .unwrap();
        assert_eq!(status.retcode, 1);
        assert_eq!(
            h.runner().argv(0),
            strs(&["semanage", "port", "-d", "-p", "udp", "6000-6010"])
        );
    }

    #[test]
    fn persist_flag_reaches_setsebool() {
        let h = host(ScriptedRunner::default().reply(0, ""));
        assert!(h.set_boolean("httpd_can_network_connect", Toggle::On, true).unwrap());
        assert_eq!(
            h.runner().argv(0),
            strs(&["setsebool", "-P", "httpd_can_network_connect", "on"])
        );
    }

    #[test]
    fn set_mode_updates_config_and_reports_live_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("config");
        std::fs::write(&cfg, "SELINUX=enforcing\nSELINUXTYPE=targeted\n").unwrap();

        let runner = ScriptedRunner::default()
            .reply(0, "")
            .reply(0, "Permissive\n");
        let h = SemanageHost::new(runner, ToolPaths::default().with_selinux_config(&cfg));

        assert_eq!(h.set_mode(Mode::Permissive).unwrap(), Mode::Permissive);
        assert_eq!(h.runner().argv(0), strs(&["setenforce", "0"]));
        assert_eq!(h.get_configured_mode().unwrap(), Mode::Permissive);
        assert_eq!(
            std::fs::read_to_string(&cfg).unwrap(),
            "SELINUX=permissive\nSELINUXTYPE=targeted\n"
        );
    }

    #[test]
    fn missing_config_is_an_io_error() {
        let h = SemanageHost::new(
            ScriptedRunner::default(),
            ToolPaths::default().with_selinux_config(PathBuf::from("/nonexistent/selinux/config")),
        );
        assert!(matches!(
            h.get_configured_mode().unwrap_err(),
            HostError::Io { .. }
        ));
    }

    #[test]
    fn fcontext_lookup_and_args() {
        let listing = "/srv/www(/.*)?   all files   system_u:object_r:httpd_sys_content_t:s0\n";
        let h = host(ScriptedRunner::default().reply(0, listing).reply(0, ""));

        let rule = h
            .get_fcontext_policy("/srv/www(/.*)?", FileType::All)
            .unwrap()
            .unwrap();
        assert_eq!(rule.sel_type, "httpd_sys_content_t");

        let mut rule = rule;
        rule.sel_type = "public_content_t".to_string();
        h.modify_fcontext_policy(&rule).unwrap();
        assert_eq!(
            h.runner().argv(1),
            strs(&[
                "semanage", "fcontext", "-m", "-f", "a", "-t", "public_content_t", "-s", "system_u",
                "-r", "s0", "/srv/www(/.*)?",
            ])
        );
    }

    #[test]
    fn subtree_filespec_relabels_recursively() {
        let h = host(ScriptedRunner::default().reply(
            0,
            "Would relabel /srv/www/index.html from a:b:user_home_t:s0 to a:b:httpd_sys_content_t:s0\n",
        ));
        let items = h.pending_relabels("/srv/www(/.*)?", false).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(h.runner().argv(0), strs(&["restorecon", "-n", "-v", "-R", "/srv/www"]));
    }

    #[test]
    fn module_listing_falls_back_to_short_form() {
        let h = host(
            ScriptedRunner::default()
                .reply(1, "")
                .reply(0, "mysql\t1.12.1\tDisabled\n"),
        );
        let m = h.list_modules().unwrap();
        assert_eq!(m["mysql"].state, ModuleState::Disabled);
        assert_eq!(h.runner().argv(1), strs(&["semodule", "-l"]));
    }
}
