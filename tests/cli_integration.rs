use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn kennel(town: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kennel").unwrap();
    cmd.env_remove("KENNEL_TOWN")
        .env("KENNEL_LOG", "warn")
        .arg("--town")
        .arg(town);
    cmd
}

#[test]
fn init_writes_config_and_provisions_pool() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["init", "--name", "gastown", "--dogs", "rex,fido"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized town gastown"));

    let config = fs::read_to_string(dir.path().join("kennel.toml")).unwrap();
    assert!(config.contains("name = \"gastown\""));
    assert!(dir.path().join("deacon/dogs/rex/.dog.json").is_file());

    kennel(dir.path())
        .args(["dogs", "list", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dog  fido  idle"))
        .stdout(predicate::str::contains("dog  rex  idle"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path()).arg("init").assert().success();
    kennel(dir.path())
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
    kennel(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("kennel.toml"), "[town\n").unwrap();
    kennel(dir.path())
        .args(["dogs", "list"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid kennel.toml"));
}

#[test]
fn dogs_add_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["dogs", "add", "alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added dog alpha"));
    kennel(dir.path())
        .args(["dogs", "add", "alpha"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    kennel(dir.path())
        .args(["dogs", "add", "../escape"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid dog name"));
    kennel(dir.path())
        .args(["dogs", "clear", "alpha"])
        .assert()
        .success();
    kennel(dir.path())
        .args(["dogs", "clear", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn mail_send_inbox_archive() {
    let dir = tempfile::tempdir().unwrap();
    let output = kennel(dir.path())
        .args(["mail", "send", "--to", "dog/alpha", "--subject", "hello", "--body", "hi"])
        .args(["--type", "task", "--from", "mayor"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(id.starts_with("msg-"));

    kennel(dir.path())
        .args(["mail", "inbox", "dog/alpha", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("\"type\": \"task\""));

    kennel(dir.path())
        .args(["mail", "archive", "dog/alpha", &id, "missing-id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Archived 1 of 2"));

    kennel(dir.path())
        .args(["mail", "inbox", "dog/alpha", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    kennel(dir.path())
        .args(["mail", "inbox", "dog/alpha", "--archived", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id));
}

#[test]
fn mail_reply_threads_back_to_sender() {
    let dir = tempfile::tempdir().unwrap();
    let output = kennel(dir.path())
        .args(["mail", "send", "--to", "dog/alpha", "--subject", "Status?"])
        .args(["--from", "mayor", "--priority", "urgent"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_string();

    kennel(dir.path())
        .args(["mail", "inbox", "dog/alpha", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notification  urgent  mayor  Status?"));

    kennel(dir.path())
        .args(["mail", "reply", "dog/alpha", &id, "--body", "all good"])
        .assert()
        .success();
    kennel(dir.path())
        .args(["mail", "inbox", "mayor", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"subject\": \"Re: Status?\""))
        .stdout(predicate::str::contains(format!("\"reply_to\": \"{id}\"")));

    kennel(dir.path())
        .args(["mail", "reply", "dog/alpha", "msg-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no active message msg-missing"));
}

#[test]
fn reading_unknown_mailbox_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["mail", "inbox", "typo", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
    kennel(dir.path())
        .args(["pending", "list", "typo", "--format", "json"])
        .assert()
        .success();
    assert!(!dir.path().join("mail/typo").exists());
}

#[test]
fn mail_rejects_traversal_address() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["mail", "send", "--to", "../etc", "--subject", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path traversal"));
}

#[test]
fn pending_list_prune_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["mail", "send", "--to", "mayor", "--subject", "POLECAT_STARTED gastown/Toast"])
        .args(["--body", "Session: gt-gastown-polecat-Toast\nIssue: gt-abc123"])
        .assert()
        .success();

    kennel(dir.path())
        .args(["pending", "list", "mayor", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "pending  gastown/Toast  gt-gastown-polecat-Toast  gt-abc123",
        ));

    kennel(dir.path())
        .args(["pending", "prune", "mayor", "--max-age", "1h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pruned 0"));

    kennel(dir.path())
        .args(["pending", "prune", "mayor", "--max-age", "later"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --max-age"));

    kennel(dir.path())
        .args(["pending", "clear", "mayor", "--session", "gt-gastown-polecat-Toast"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1"));

    kennel(dir.path())
        .args(["pending", "list", "mayor", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn cycle_on_empty_town_reports_zeroes() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .args(["cycle", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dispatched\": 0"))
        .stdout(predicate::str::contains("\"timed_out\": false"));
}

#[test]
fn plugins_list_shows_gate() {
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins/rotate");
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(
        plugin_dir.join("plugin.md"),
        "+++\nname = \"rotate-logs\"\n[gate]\ntype = \"cooldown\"\nduration = \"1h\"\n+++\nRotate.\n",
    )
    .unwrap();

    kennel(dir.path())
        .args(["plugins", "list", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plugin  rotate-logs  town  gate=cooldown 1h  eligible=true"));
}

#[test]
fn schema_describes_config() {
    let dir = tempfile::tempdir().unwrap();
    kennel(dir.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Config\""))
        .stdout(predicate::str::contains("cycle_timeout_secs"));
}
