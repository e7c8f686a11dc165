//! Parsers for the text the SELinux tools print.
//!
//! Each parser takes the raw stdout of one tool and returns typed values.
//! Lines that do not fit the expected shape (headers, blank lines, banner
//! text) are skipped; only a structurally impossible answer is an error.

use std::collections::BTreeMap;

use sepol_reconcile::{
    BooleanState, FcontextPolicy, FileType, HostError, Mode, ModuleInfo, ModuleState, PortPolicy,
    PortRange, Protocol, Relabel, Toggle,
};

fn parse_error(tool: &str, detail: impl Into<String>) -> HostError {
    HostError::Parse {
        tool: tool.to_string(),
        detail: detail.into(),
    }
}

/// `getenforce` prints a single word.
pub fn getenforce(stdout: &str) -> Result<Mode, HostError> {
    let word = stdout.trim();
    Mode::from_reported(word).ok_or_else(|| parse_error("getenforce", format!("unknown mode {word:?}")))
}

/// The `SELINUX=` key of the boot configuration file.
pub fn config_mode(contents: &str) -> Result<Mode, HostError> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| l.strip_prefix("SELINUX="))
        .and_then(|v| Mode::from_reported(v.trim_matches('"')))
        .ok_or_else(|| parse_error("selinux config", "no valid SELINUX= line"))
}

/// Rewrite the `SELINUX=` key, appending it when absent. Comments and every
/// other line are preserved.
pub fn rewrite_config_mode(contents: &str, mode: Mode) -> String {
    let value = format!("SELINUX={}", mode.as_str().to_ascii_lowercase());
    let mut replaced = false;
    let mut out: Vec<String> = contents
        .lines()
        .map(|line| {
            if !replaced && line.trim_start().starts_with("SELINUX=") {
                replaced = true;
                value.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        out.push(value);
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// `semanage boolean -l`:
///
/// ```text
/// SELinux boolean                State  Default Description
///
/// abrt_anon_write                (off  ,  off)  Allow abrt to anon write
/// ```
pub fn booleans(stdout: &str) -> BTreeMap<String, BooleanState> {
    stdout
        .lines()
        .filter_map(|line| {
            let name = line.split_whitespace().next()?;
            let open = line.find('(')?;
            let close = open + line[open..].find(')')?;
            let (state, default) = line[open + 1..close].split_once(',')?;
            Some((
                name.to_string(),
                BooleanState::new(Toggle::parse(state)?, Toggle::parse(default)?),
            ))
        })
        .collect()
}

/// `semanage port -l`, one row per type and protocol:
///
/// ```text
/// http_port_t                    tcp      80, 81, 443, 488, 8008, 8009, 8443, 9000
/// ```
pub fn port_rows(stdout: &str) -> Vec<(String, Protocol, Vec<PortRange>)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let sel_type = parts.next()?;
            let protocol: Protocol = parts.next()?.parse().ok()?;
            let ports: Vec<PortRange> = parts
                .collect::<Vec<_>>()
                .join(" ")
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            (!ports.is_empty()).then(|| (sel_type.to_string(), protocol, ports))
        })
        .collect()
}

/// First row of `stdout` binding exactly `protocol`/`port`.
///
/// `semanage port -l` groups rows by type name, so a port changed with `-m`
/// can match more than one row there. Callers look in the `-l -C` (local)
/// listing first.
pub fn find_port(stdout: &str, protocol: Protocol, port: PortRange) -> Option<PortPolicy> {
    port_rows(stdout)
        .into_iter()
        .find(|(_, proto, ports)| *proto == protocol && ports.contains(&port))
        .map(|(sel_type, _, _)| PortPolicy::new(sel_type, protocol, port))
}

/// `semanage fcontext -l`:
///
/// ```text
/// /srv/www(/.*)?        all files     system_u:object_r:httpd_sys_content_t:s0
/// /var/run/foo.sock     socket        <<None>>
/// ```
pub fn fcontext_rows(stdout: &str) -> Vec<FcontextPolicy> {
    stdout
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                return None;
            }
            let filespec = tokens[0];
            let context = tokens[tokens.len() - 1];
            let filetype = FileType::from_description(&tokens[1..tokens.len() - 1].join(" "))?;

            let fields: Vec<&str> = context.splitn(4, ':').collect();
            let [user, role, sel_type, rest @ ..] = fields.as_slice() else {
                return None;
            };
            Some(FcontextPolicy {
                filespec: filespec.to_string(),
                filetype,
                sel_user: user.to_string(),
                sel_role: role.to_string(),
                sel_type: sel_type.to_string(),
                sel_level: rest.first().map(|l| l.to_string()),
            })
        })
        .collect()
}

/// `restorecon -n -v` ("Would relabel ...") and `restorecon -v`
/// ("Relabeled ...") lines:
///
/// ```text
/// Would relabel /srv/www/index.html from unconfined_u:object_r:user_home_t:s0 to unconfined_u:object_r:httpd_sys_content_t:s0
/// ```
pub fn relabels(stdout: &str) -> Vec<Relabel> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("Would relabel ")
                .or_else(|| line.strip_prefix("Relabeled "))?;
            let (path, labels) = rest.rsplit_once(" from ")?;
            let (from, to) = labels.split_once(" to ")?;
            Some(Relabel {
                path: path.to_string(),
                from: from.trim().to_string(),
                to: to.trim().to_string(),
            })
        })
        .collect()
}

/// `semodule -l` (pre-2.4: `name version [Disabled]`) or
/// `semodule --list-modules=full` (`priority name kind [disabled]`).
pub fn modules(stdout: &str) -> BTreeMap<String, ModuleInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let first = *tokens.first()?;
            let disabled = tokens.iter().any(|t| t.eq_ignore_ascii_case("disabled"));
            let state = if disabled {
                ModuleState::Disabled
            } else {
                ModuleState::Enabled
            };

            if first.bytes().all(|b| b.is_ascii_digit()) {
                let name = *tokens.get(1)?;
                Some((name.to_string(), ModuleInfo { version: None, state }))
            } else {
                let version = tokens
                    .get(1)
                    .filter(|v| !v.eq_ignore_ascii_case("disabled"))
                    .map(|v| v.to_string());
                Some((first.to_string(), ModuleInfo { version, state }))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getenforce_words() {
        assert_eq!(getenforce("Enforcing\n").unwrap(), Mode::Enforcing);
        assert_eq!(getenforce("Disabled").unwrap(), Mode::Disabled);
        assert!(getenforce("").is_err());
    }

    #[test]
    fn config_mode_ignores_comments() {
        let cfg = "# SELINUX=disabled\nSELINUX=permissive\nSELINUXTYPE=targeted\n";
        assert_eq!(config_mode(cfg).unwrap(), Mode::Permissive);
        assert!(config_mode("SELINUXTYPE=targeted\n").is_err());
    }

    #[test]
    fn rewrite_keeps_other_lines() {
        let cfg = "# comment\nSELINUX=permissive\nSELINUXTYPE=targeted\n";
        let out = rewrite_config_mode(cfg, Mode::Enforcing);
        assert_eq!(out, "# comment\nSELINUX=enforcing\nSELINUXTYPE=targeted\n");

        let out = rewrite_config_mode("SELINUXTYPE=targeted\n", Mode::Permissive);
        assert_eq!(out, "SELINUXTYPE=targeted\nSELINUX=permissive\n");
    }

    #[test]
    fn boolean_table() {
        let out = "SELinux boolean                State  Default Description\n\n\
                   abrt_anon_write                (off  ,  off)  Allow abrt to anon write\n\
                   samba_create_home_dirs         (off  ,   on)  Allow samba to create home dirs\n";
        let table = booleans(out);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table["samba_create_home_dirs"],
            BooleanState::new(Toggle::Off, Toggle::On)
        );
    }

    #[test]
    fn port_lookup_matches_exact_entry() {
        let out = "SELinux Port Type              Proto    Port Number\n\n\
                   http_cache_port_t              tcp      8080, 8118, 8123, 10001-10010\n\
                   http_port_t                    tcp      80, 81, 443, 488, 8008, 8009, 8443, 9000\n\
                   x11_port_t                     udp      6000-6020\n";

        let p = find_port(out, Protocol::Tcp, PortRange::single(8080)).unwrap();
        assert_eq!(p.sel_type, "http_cache_port_t");

        let range = "10001-10010".parse().unwrap();
        assert_eq!(
            find_port(out, Protocol::Tcp, range).map(|p| p.sel_type),
            Some("http_cache_port_t".to_string())
        );
        assert!(find_port(out, Protocol::Udp, PortRange::single(8080)).is_none());
        // a port inside a range is not the range itself
        assert!(find_port(out, Protocol::Udp, PortRange::single(6001)).is_none());
    }

    #[test]
    fn fcontext_table() {
        let out = "SELinux fcontext                                   type               Context\n\n\
                   /srv/www(/.*)?                                     all files          system_u:object_r:httpd_sys_content_t:s0\n\
                   /var/run/foo\\.sock                                 socket             <<None>>\n\
                   /dev/tty[0-9]*                                     character device   system_u:object_r:tty_device_t:s0\n";
        let rows = fcontext_rows(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].filetype, FileType::All);
        assert_eq!(rows[0].sel_type, "httpd_sys_content_t");
        assert_eq!(rows[0].sel_level.as_deref(), Some("s0"));
        assert_eq!(rows[1].filetype, FileType::CharDevice);
    }

    #[test]
    fn restorecon_lines() {
        let out = "Would relabel /srv/www/index.html from unconfined_u:object_r:user_home_t:s0 to unconfined_u:object_r:httpd_sys_content_t:s0\n\
                   restorecon: something unrelated\n\
                   Relabeled /srv/www/a b.txt from system_u:object_r:var_t:s0 to system_u:object_r:httpd_sys_content_t:s0\n";
        let items = relabels(out);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].path, "/srv/www/index.html");
        assert_eq!(items[1].path, "/srv/www/a b.txt");
        assert_eq!(items[1].from, "system_u:object_r:var_t:s0");
    }

    #[test]
    fn module_listings_old_and_new() {
        let old = "abrt\t1.4.1\nmysql\t1.12.1\tDisabled\n";
        let m = modules(old);
        assert_eq!(m["abrt"].version.as_deref(), Some("1.4.1"));
        assert_eq!(m["mysql"].state, ModuleState::Disabled);

        let new = "100 abrt              pp\n400 mysql             pp disabled\n";
        let m = modules(new);
        assert_eq!(m["abrt"].state, ModuleState::Enabled);
        assert_eq!(m["mysql"].state, ModuleState::Disabled);
        assert!(m["mysql"].version.is_none());
    }
}
