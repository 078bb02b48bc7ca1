//! End-to-end tests of the check/in/out binaries.
//!
//! Every test stores state in a temporary directory through the `local`
//! backend and runs `out` against a shell script standing in for bbl.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Fake bbl: `<command> --state-dir <dir> [args...]`
const FAKE_BBL: &str = r#"#!/bin/sh
command="$1"
state_dir="$3"
state="$state_dir/bbl-state.json"
case "$command" in
  up)
    if [ -f "$state" ]; then
      printf '{"ups":2}' > "$state"
    else
      printf '{"ups":1}' > "$state"
    fi
    ;;
  down|destroy)
    rm -f "$state"
    ;;
  fail-with-state)
    printf '{"partial":true}' > "$state"
    echo "bbl: misconfigured" >&2
    exit 1
    ;;
  fail)
    exit 1
    ;;
  noop)
    ;;
esac
"#;

/// Isolated store, scratch directories and fake bbl for one test.
struct TestEnv {
    temp: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        let env = Self {
            temp: TempDir::new().unwrap(),
        };
        let bbl = env.bbl_path();
        std::fs::write(&bbl, FAKE_BBL).unwrap();
        std::fs::set_permissions(&bbl, std::fs::Permissions::from_mode(0o755)).unwrap();
        env
    }

    fn bbl_path(&self) -> PathBuf {
        self.temp.path().join("bbl")
    }

    fn store_path(&self) -> PathBuf {
        self.temp.path().join("store")
    }

    /// A fresh, not yet created directory under the temp root.
    fn dir(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    /// Where `out` keeps the state file inside its working directory.
    fn out_state(&self, working: &Path) -> PathBuf {
        working.join("bbl-state").join("bbl-state.json")
    }

    fn source(&self, name: &str) -> String {
        format!(
            r#"{{"iaas": "gcp", "backend": "local", "bucket": "{}", "name": "{}"}}"#,
            self.store_path().display(),
            name
        )
    }

    fn unpinned_in(&self, name: &str, target: &Path) -> String {
        let output = self
            .get(format!(r#"{{"source": {}}}"#, self.source(name)), target)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(output).unwrap()
    }

    fn check(&self, request: String) -> Command {
        let mut cmd: Command = cargo_bin_cmd!("check");
        cmd.write_stdin(request);
        cmd
    }

    fn get(&self, request: String, target: &Path) -> Command {
        let mut cmd: Command = cargo_bin_cmd!("in");
        cmd.arg(target).write_stdin(request);
        cmd
    }

    fn put(&self, request: String, working: &Path) -> Command {
        let mut cmd: Command = cargo_bin_cmd!("out");
        cmd.arg(working)
            .env("BSR_BBL_BINARY", self.bbl_path())
            .write_stdin(request);
        cmd
    }

    fn put_request(&self, name: &str, command: &str) -> String {
        format!(
            r#"{{"source": {}, "params": {{"command": "{}"}}}}"#,
            self.source(name),
            command
        )
    }

    /// Run `out` successfully and return the reported version.
    fn put_ok(&self, name: &str, command: &str, working: &Path) -> Value {
        let output = self
            .put(self.put_request(name, command), working)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let response: Value = serde_json::from_slice(&output).unwrap();
        response["version"].clone()
    }

    fn check_refs(&self, name: &str, version: Option<&str>) -> Vec<String> {
        let request = match version {
            Some(reference) => format!(
                r#"{{"source": {}, "version": {{"ref": "{}"}}}}"#,
                self.source(name),
                reference
            ),
            None => format!(r#"{{"source": {}}}"#, self.source(name)),
        };
        let output = self
            .check(request)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let versions: Vec<Value> = serde_json::from_slice(&output).unwrap();
        versions
            .iter()
            .map(|v| v["ref"].as_str().unwrap().to_string())
            .collect()
    }
}

#[test]
fn check_on_empty_store_prints_empty_list() {
    let env = TestEnv::new();
    let request = format!(
        r#"{{"source": {}, "version": {{"ref": "the-greatest"}}}}"#,
        env.source("empty")
    );

    env.check(request).assert().success().stdout("[]");
}

#[test]
fn out_up_publishes_named_version() {
    let env = TestEnv::new();
    let working = env.dir("up");

    let version = env.put_ok("prod", "up", &working);
    assert_eq!(version["name"], "prod");
    assert!(version["ref"].is_string());
    assert!(version["updated"].is_string());
    assert_eq!(
        std::fs::read_to_string(env.out_state(&working)).unwrap(),
        r#"{"ups":1}"#
    );

    let reference = version["ref"].as_str().unwrap().to_string();
    assert_eq!(env.check_refs("prod", None), vec![reference]);
}

#[test]
fn out_seeds_from_latest_state_in_a_new_directory() {
    let env = TestEnv::new();
    let first = env.put_ok("prod", "up", &env.dir("first"));
    let second = env.put_ok("prod", "up", &env.dir("second"));

    assert_eq!(
        std::fs::read_to_string(env.out_state(&env.dir("second"))).unwrap(),
        r#"{"ups":2}"#
    );

    let first_ref = first["ref"].as_str().unwrap();
    let second_ref = second["ref"].as_str().unwrap();
    assert_eq!(
        env.check_refs("prod", Some(first_ref)),
        vec![first_ref.to_string(), second_ref.to_string()]
    );
    assert_eq!(
        env.check_refs("prod", Some("unknown")),
        vec![second_ref.to_string()]
    );
}

#[test]
fn in_fetches_pinned_version() {
    let env = TestEnv::new();
    let first = env.put_ok("prod", "up", &env.dir("first"));
    env.put_ok("prod", "up", &env.dir("second"));

    let first_ref = first["ref"].as_str().unwrap();
    let request = format!(
        r#"{{"source": {}, "version": {{"ref": "{}"}}}}"#,
        env.source("prod"),
        first_ref
    );
    let target = env.dir("get");
    env.get(request, &target)
        .assert()
        .success()
        .stdout(format!(r#"{{"version":{{"ref":"{}"}}}}"#, first_ref));

    assert_eq!(
        std::fs::read_to_string(target.join("bbl-state.json")).unwrap(),
        r#"{"ups":1}"#
    );
}

#[test]
fn in_without_stored_state_reports_null_version() {
    let env = TestEnv::new();
    let request = format!(r#"{{"source": {}}}"#, env.source("never"));
    let target = env.dir("get");

    env.get(request, &target)
        .assert()
        .success()
        .stdout(r#"{"version":null}"#);
    assert!(!target.join("bbl-state.json").exists());
}

#[test]
fn in_with_unknown_version_fails() {
    let env = TestEnv::new();
    env.put_ok("prod", "up", &env.dir("up"));
    let request = format!(
        r#"{{"source": {}, "version": {{"ref": "999"}}}}"#,
        env.source("prod")
    );

    env.get(request, &env.dir("get"))
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("Version 999 of prod/bbl-state.json not found"));
}

#[test]
fn out_down_removes_state_without_new_version() {
    let env = TestEnv::new();
    let up = env.put_ok("prod", "up", &env.dir("up"));

    let working = env.dir("down");
    let down = env.put_ok("prod", "down", &working);
    assert_eq!(down["ref"], up["ref"]);
    assert_eq!(down["name"], "prod");
    assert!(down["updated"].is_string());
    assert!(!env.out_state(&working).exists());

    let up_ref = up["ref"].as_str().unwrap().to_string();
    assert_eq!(env.check_refs("prod", None), vec![up_ref.clone()]);

    let target = env.dir("after-down");
    assert_eq!(env.unpinned_in("prod", &target), r#"{"version":null}"#);
    assert!(!target.join("bbl-state.json").exists());

    let pinned = env.dir("pinned");
    let request = format!(
        r#"{{"source": {}, "version": {{"ref": "{}"}}}}"#,
        env.source("prod"),
        up_ref
    );
    env.get(request, &pinned).assert().success();
    assert_eq!(
        std::fs::read_to_string(pinned.join("bbl-state.json")).unwrap(),
        r#"{"ups":1}"#
    );
}

#[test]
fn out_up_after_down_starts_from_scratch() {
    let env = TestEnv::new();
    env.put_ok("prod", "up", &env.dir("up"));
    env.put_ok("prod", "down", &env.dir("down"));

    let working = env.dir("again");
    let again = env.put_ok("prod", "up", &working);
    assert_eq!(
        std::fs::read_to_string(env.out_state(&working)).unwrap(),
        r#"{"ups":1}"#
    );

    let target = env.dir("get");
    assert_eq!(
        env.unpinned_in("prod", &target),
        format!(r#"{{"version":{{"ref":"{}"}}}}"#, again["ref"].as_str().unwrap())
    );
}

#[test]
fn out_failure_uploads_partial_state() {
    let env = TestEnv::new();
    env.put(
        env.put_request("broken", "fail-with-state"),
        &env.dir("broken"),
    )
    .assert()
    .failure()
    .stdout("")
    .stderr(predicate::str::contains("partial state uploaded as version"))
    .stderr(predicate::str::contains("bbl: misconfigured"));

    let refs = env.check_refs("broken", None);
    assert_eq!(refs.len(), 1);

    let target = env.dir("get");
    let request = format!(
        r#"{{"source": {}, "version": {{"ref": "{}"}}}}"#,
        env.source("broken"),
        refs[0]
    );
    env.get(request, &target).assert().success();
    assert_eq!(
        std::fs::read_to_string(target.join("bbl-state.json")).unwrap(),
        r#"{"partial":true}"#
    );
}

#[test]
fn out_failure_without_state_publishes_nothing() {
    let env = TestEnv::new();
    env.put(env.put_request("broken", "fail"), &env.dir("broken"))
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("Provisioning command 'fail' failed"));

    assert!(env.check_refs("broken", None).is_empty());
}

#[test]
fn out_without_state_after_non_teardown_fails() {
    let env = TestEnv::new();
    env.put(env.put_request("prod", "noop"), &env.dir("noop"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("left no state file"));
}

#[test]
fn environments_sharing_a_store_stay_separate() {
    let env = TestEnv::new();
    env.put_ok("prod", "up", &env.dir("prod"));

    assert_eq!(env.check_refs("prod", None).len(), 1);
    assert!(env.check_refs("staging", None).is_empty());
}

#[test]
fn malformed_request_fails_before_touching_the_store() {
    let env = TestEnv::new();
    env.check("{\"source\": ".to_string())
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("Invalid parameters"));
    assert!(!env.store_path().exists());
}

#[test]
fn gcp_source_fields_are_accepted() {
    let env = TestEnv::new();
    let request = format!(
        r#"{{"source": {{"name": "prod", "iaas": "gcp", "gcp-region": "us-east1", "gcp-service-account-key": "{{}}", "backend": "local", "bucket": "{}"}}, "version": {{"ref": "the-greatest"}}}}"#,
        env.store_path().display()
    );
    env.check(request).assert().success().stdout("[]");
}

#[test]
fn unknown_source_field_is_rejected() {
    let env = TestEnv::new();
    let request = r#"{"source": {"iaas": "aws", "bucket": "b", "azure-subscription-id": "x"}}"#;
    env.check(request.to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field"));
}

#[test]
fn in_requires_target_directory() {
    let env = TestEnv::new();
    let request = format!(r#"{{"source": {}}}"#, env.source("prod"));
    let mut cmd: Command = cargo_bin_cmd!("in");
    cmd.write_stdin(request).assert().failure();
}
