//! CLI subprocess integration tests.
//!
//! These tests invoke the `smbop` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output stability.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn smbop_bin(store: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_smbop"));
    cmd.args(["--store", &store.to_string_lossy()]);
    cmd.env_remove("SMBOP_LOG");
    cmd
}

fn run(store: &Path, args: &[&str]) -> Output {
    smbop_bin(store).args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    let out = stdout(output);
    serde_json::from_str(&out).unwrap_or_else(|e| panic!("invalid JSON output: {e}\n{out}"))
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn share_manifest(dir: &Path, name: &str, claim: &str) -> PathBuf {
    write_file(
        dir,
        &format!("{name}.toml"),
        &format!(
            r#"kind = "SmbShare"
namespace = "default"
name = "{name}"

[spec]
read_only = true

[spec.scaling]
group_mode = "explicit"
group = "g1"

[spec.storage.pvc]
name = "{claim}"
"#
        ),
    )
}

fn apply(store: &Path, manifest: &Path) {
    let output = run(store, &["apply", &manifest.to_string_lossy()]);
    assert!(
        output.status.success(),
        "apply must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn cli_version_exits_zero() {
    let store = tempfile::tempdir().unwrap();
    let output = run(store.path(), &["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("smbop"));
}

#[test]
fn cli_help_lists_commands() {
    let store = tempfile::tempdir().unwrap();
    let output = run(store.path(), &["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    for cmd in ["apply", "reconcile", "reconcile-all", "show-config", "verify-store"] {
        assert!(out.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_apply_is_idempotent() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let manifest = share_manifest(project.path(), "s1", "data");

    let first = run(store.path(), &["--json", "apply", &manifest.to_string_lossy()]);
    assert!(first.status.success());
    assert_eq!(json(&first)[0]["action"], "created");

    let second = run(store.path(), &["--json", "apply", &manifest.to_string_lossy()]);
    assert!(second.status.success());
    assert_eq!(json(&second)[0]["action"], "unchanged");
}

#[test]
fn cli_apply_invalid_manifest_is_config_error() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_file(
        project.path(),
        "bad.toml",
        r#"kind = "SmbShare"
namespace = "default"
name = "s1"

[spec]
no_such_field = true
"#,
    );

    let output = run(store.path(), &["apply", &manifest.to_string_lossy()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("manifest error"));
}

#[test]
fn cli_reconcile_until_done_converges() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));

    let output = run(
        store.path(),
        &["--json", "reconcile", "default/s1", "--until-done"],
    );
    assert!(
        output.status.success(),
        "reconcile must exit 0. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json(&output);
    assert_eq!(report["outcome"], "done");
    assert_eq!(report["state"], "converged");

    let config = run(store.path(), &["show-config", "default"]);
    assert!(config.status.success());
    let doc = json(&config);
    assert_eq!(doc["samba-container-config"], "v0");
    assert_eq!(doc["configs"]["g1"]["shares"][0], "s1");
    assert_eq!(doc["shares"]["s1"]["options"]["read only"], "yes");
    assert_eq!(doc["shares"]["s1"]["options"]["path"], "/mnt/data");

    let list = run(store.path(), &["--json", "list", "deployment"]);
    assert!(list.status.success());
    assert_eq!(json(&list)[0]["key"]["name"], "g1");
}

#[test]
fn cli_single_pass_requeues() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));

    let output = run(store.path(), &["--json", "reconcile", "default/s1"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["outcome"], "requeue");
}

#[test]
fn cli_incompatible_share_exits_invalid() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "one"));
    apply(store.path(), &share_manifest(project.path(), "s2", "two"));

    let output = run(store.path(), &["--json", "reconcile-all"]);
    assert_eq!(output.status.code(), Some(4));
    let rows = json(&output);
    let halted: Vec<_> = rows
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["halted"] == true)
        .map(|r| r["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(halted, vec!["s2"]);

    let events = run(store.path(), &["--json", "events", "default"]);
    assert!(events.status.success());
    let events = json(&events);
    assert_eq!(events[0]["reason"], "InvalidConfiguration");
    assert_eq!(events[0]["involved"]["name"], "s2");
}

#[test]
fn cli_delete_then_reconcile_tears_down() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));
    let output = run(store.path(), &["reconcile", "default/s1", "--until-done"]);
    assert!(output.status.success());

    let output = run(store.path(), &["--json", "delete", "share", "default/s1"]);
    assert!(output.status.success());
    let deleted = json(&output);
    assert_eq!(deleted["removed"], false);
    assert_eq!(deleted["pending_finalizers"][0], "smbop.io/finalizer");

    let output = run(
        store.path(),
        &["--json", "reconcile", "default/s1", "--until-done"],
    );
    assert!(output.status.success());
    assert_eq!(json(&output)["state"], "absent");

    let config = run(store.path(), &["show-config", "default"]);
    assert_eq!(config.status.code(), Some(1));

    for kind in ["share", "deployment", "service"] {
        let list = run(store.path(), &["--json", "list", kind]);
        assert!(list.status.success());
        assert_eq!(json(&list), serde_json::json!([]), "{kind} left behind");
    }
}

#[test]
fn cli_missing_dependency_fails() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let manifest = write_file(
        project.path(),
        "s1.json",
        r#"{"kind": "SmbShare", "namespace": "default", "name": "s1",
            "spec": {"storage": {"pvc": {"name": "data"}}, "security_config": "missing"}}"#,
    );
    apply(store.path(), &manifest);

    let output = run(store.path(), &["reconcile", "default/s1", "--until-done"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}

#[test]
fn cli_config_file_is_honored() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let config = write_file(
        project.path(),
        "operator.toml",
        "document_name = \"custom-config\"\nsmb_port = 4445\n",
    );
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));

    let output = smbop_bin(store.path())
        .args(["--config", &config.to_string_lossy()])
        .args(["reconcile", "default/s1", "--until-done"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let list = run(store.path(), &["--json", "list", "cm"]);
    assert_eq!(json(&list)[0]["key"]["name"], "custom-config");

    let shown = smbop_bin(store.path())
        .args(["--config", &config.to_string_lossy()])
        .args(["show-config", "default"])
        .output()
        .unwrap();
    assert!(shown.status.success());
    assert_eq!(json(&shown)["globals"]["globals"]["options"]["smb ports"], "4445");
}

#[test]
fn cli_bad_config_file_is_config_error() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let config = write_file(project.path(), "operator.toml", "unknown_key = 1\n");

    let output = smbop_bin(store.path())
        .args(["--config", &config.to_string_lossy()])
        .args(["reconcile-all"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_invalid_target_fails() {
    let store = tempfile::tempdir().unwrap();
    let output = run(store.path(), &["reconcile", "no-namespace"]);
    assert_eq!(output.status.code(), Some(1));
    let output = run(store.path(), &["list", "pods"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_verify_store_clean() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));
    run(store.path(), &["reconcile", "default/s1", "--until-done"]);

    let output = run(store.path(), &["--json", "verify-store"]);
    assert!(output.status.success());
    let report = json(&output);
    assert_eq!(report["failed"], 0);
    assert!(report["checked"].as_u64().unwrap() >= 4);
}

#[test]
fn cli_verify_store_detects_tampering() {
    let store = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    apply(store.path(), &share_manifest(project.path(), "s1", "data"));

    let path = store
        .path()
        .join("store/objects/default/SmbShare/s1.json");
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replace("\"read_only\": true", "\"read_only\": false")).unwrap();

    let output = run(store.path(), &["verify-store"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stdout(&output).contains("FAIL"));
}

#[test]
fn cli_completions_generate() {
    let store = tempfile::tempdir().unwrap();
    let output = run(store.path(), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("smbop"));
}
