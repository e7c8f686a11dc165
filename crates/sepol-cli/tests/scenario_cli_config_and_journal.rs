use predicates::prelude::*;

fn sepol(dir: &std::path::Path) -> anyhow::Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("sepol")?;
    cmd.current_dir(dir).env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn config_hash_prints_hash_and_canonical_json() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    std::fs::write(&base, "engine:\n  simulate_only: false\naudit:\n  hash_chain: true\n")?;
    std::fs::write(&overlay, "engine:\n  simulate_only: true\n")?;

    let base_s = base.to_string_lossy().into_owned();
    let overlay_s = overlay.to_string_lossy().into_owned();

    let out = sepol(dir.path())?
        .args(["config-hash", &base_s, &overlay_s])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let out = String::from_utf8(out)?;
    let mut lines = out.lines();

    let hash = lines
        .next()
        .and_then(|l| l.strip_prefix("config_hash="))
        .unwrap_or_default();
    assert_eq!(hash.len(), 64);
    assert_eq!(
        lines.next(),
        Some(r#"{"audit":{"hash_chain":true},"engine":{"simulate_only":true}}"#)
    );
    Ok(())
}

#[test]
fn config_hash_requires_a_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    sepol(dir.path())?.arg("config-hash").assert().failure();
    Ok(())
}

#[test]
fn empty_journal_is_intact() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let journal = dir.path().join("journal.jsonl");
    std::fs::write(&journal, "")?;
    let journal_s = journal.to_string_lossy().into_owned();

    sepol(dir.path())?
        .args(["journal", "verify", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("journal_intact=true entries=0"));
    Ok(())
}

#[test]
fn outcomes_are_journaled_and_verify() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let journal = dir.path().join("audit/journal.jsonl");
    let journal_s = journal.to_string_lossy().into_owned();
    let run_id = "0d9b3c3e-8f55-4c0e-9a51-2f1f6f0c7a10";

    for mode in ["bogus", "Disabled"] {
        sepol(dir.path())?
            .args(["--journal", &journal_s, "--run-id", run_id, "mode", mode])
            .assert()
            .code(2);
    }

    let content = std::fs::read_to_string(&journal)?;
    let entries: Vec<serde_json::Value> = content
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["seq"], 1);
    assert_eq!(entries[0]["run_id"], run_id);
    assert_eq!(entries[0]["kind"], "mode");

    sepol(dir.path())?
        .args(["journal", "verify", &journal_s])
        .assert()
        .success()
        .stdout(predicate::str::contains("journal_intact=true entries=2"));

    std::fs::write(&journal, content.replace("bogus", "Bogus"))?;
    sepol(dir.path())?
        .args(["journal", "verify", &journal_s])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("journal_intact=false line=1"));
    Ok(())
}

#[test]
fn journal_path_can_come_from_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cfg = dir.path().join("sepol.yaml");
    let journal = dir.path().join("from-config.jsonl");
    std::fs::write(
        &cfg,
        format!("audit:\n  path: {}\n  hash_chain: false\n", journal.display()),
    )?;

    let cfg_s = cfg.to_string_lossy().into_owned();

    sepol(dir.path())?
        .args(["--config", &cfg_s, "mode", "bogus"])
        .assert()
        .code(2);

    let line = std::fs::read_to_string(&journal)?;
    let entry: serde_json::Value = serde_json::from_str(line.trim())?;
    assert_eq!(entry["hash_self"], serde_json::Value::Null);
    Ok(())
}
