//! Requests that fail validation are answered without touching the host,
//! so these run the same on machines without SELinux tooling.

use predicates::prelude::*;

fn sepol(dir: &std::path::Path) -> anyhow::Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("sepol")?;
    cmd.current_dir(dir).env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn unknown_mode_reports_false_and_exits_2() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = sepol(dir.path())?
        .args(["mode", "bogus"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let record: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(record["name"], "bogus");
    assert_eq!(record["result"], false);
    assert_eq!(record["comment"], "bogus is not an accepted mode");
    assert_eq!(record["changes"], serde_json::json!({}));
    Ok(())
}

#[test]
fn malformed_port_target_fails_before_lookup() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    sepol(dir.path())?
        .args(["--test", "port", "present", "nope", "--sel-type", "http_port_t"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"result\": false"));
    Ok(())
}

#[test]
fn bad_boolean_value_is_a_usage_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    sepol(dir.path())?
        .args(["boolean", "httpd_can_network_connect", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a boolean value"));
    Ok(())
}

#[test]
fn unknown_filetype_is_a_usage_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    sepol(dir.path())?
        .args(["fcontext", "present", "/srv/www(/.*)?", "--filetype", "q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a file type"));
    Ok(())
}

#[test]
fn unknown_tool_override_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("sepol.yaml");
    std::fs::write(&cfg, "host:\n  tools:\n    chcon: /usr/bin/chcon\n")?;

    sepol(dir.path())?
        .args(["--config", cfg.to_str().unwrap_or_default(), "mode", "bogus"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown tool \"chcon\""));
    Ok(())
}

#[test]
fn strict_config_refuses_unread_keys() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("sepol.yaml");
    std::fs::write(&cfg, "engine:\n  simulate_only: true\n  retries: 3\n")?;
    let cfg_s = cfg.to_string_lossy().into_owned();

    sepol(dir.path())?
        .args(["--config", &cfg_s, "--strict-config", "mode", "bogus"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));

    // without --strict-config the same file only warns
    sepol(dir.path())?
        .args(["--config", &cfg_s, "mode", "bogus"])
        .assert()
        .code(2);
    Ok(())
}
