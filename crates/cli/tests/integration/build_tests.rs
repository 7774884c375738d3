//! Build command integration tests.

use predicates::prelude::*;
use serial_test::serial;

use super::common::{FAIL_MARKER, TestEnv};

const NGINX: &str = "BASE fedora-23\nMAINTAINER ops@example.com\nMUTATE dnf -y install nginx\n";

#[test]
#[serial]
fn build_creates_layers() {
  let env = TestEnv::with_script(NGINX);

  env
    .strata_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete!"))
    .stdout(predicate::str::contains("Built: 3"));

  assert_eq!(env.calls("virt-builder").len(), 1);
  assert_eq!(env.calls("qemu-img").len(), 2);
  assert_eq!(env.calls("virt-customize").len(), 1);
  assert!(env.store_path().join("layers/fedora-23.qcow2").is_file());
}

#[test]
#[serial]
fn second_build_is_cached() {
  let env = TestEnv::with_script(NGINX);
  env.strata_cmd().arg("build").assert().success();
  env.clear_calls();

  env
    .strata_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached: 3"))
    .stdout(predicate::str::contains("Built: 0"));

  assert!(env.calls("virt-builder").is_empty());
  assert!(env.calls("qemu-img").is_empty());
  assert!(env.calls("virt-customize").is_empty());
}

#[test]
#[serial]
fn force_rebuild_reruns_mutations() {
  let env = TestEnv::with_script(NGINX);
  env.strata_cmd().arg("build").assert().success();
  env.clear_calls();

  env.strata_cmd().args(["build", "--force"]).assert().success();

  assert!(env.calls("virt-builder").is_empty());
  assert_eq!(env.calls("qemu-img").len(), 2);
  assert_eq!(env.calls("virt-customize").len(), 1);
}

#[test]
#[serial]
fn changing_a_step_rebuilds_only_the_suffix() {
  let env = TestEnv::with_script("BASE fedora-23\nMUTATE echo one\nMUTATE echo two\n");
  env.strata_cmd().arg("build").assert().success();
  env.clear_calls();

  env.write_script("BASE fedora-23\nMUTATE echo one\nMUTATE echo three\n");
  env
    .strata_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached: 2"))
    .stdout(predicate::str::contains("Built: 1"));

  let customize = env.calls("virt-customize");
  assert_eq!(customize.len(), 1);
  assert!(customize[0].contains("echo three"));
}

#[test]
#[serial]
fn build_with_tag_creates_tag_disk() {
  let env = TestEnv::with_script(NGINX);

  env
    .strata_cmd()
    .args(["build", "--tag", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Tag: web"));

  let tag = env.store_path().join("tags/web.qcow2");
  let content = std::fs::read_to_string(tag).unwrap();
  assert!(content.starts_with("backing:"));
  assert!(content.contains("/layers/"));
}

#[test]
#[serial]
fn failing_mutation_names_the_directive() {
  let env = TestEnv::with_script(&format!("BASE fedora-23\nMUTATE run {}\n", FAIL_MARKER));

  env
    .strata_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains(format!("MUTATE:run {}", FAIL_MARKER)))
    .stderr(predicate::str::contains("command exited with status 42"));

  // The plan does not treat the failed layer as cached.
  env
    .strata_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("1 cached, 1 to build"));
}

#[test]
#[serial]
fn strict_build_rejects_unknown_directive() {
  let env = TestEnv::with_script("BASE fedora-23\nEXPOSE 80\n");

  env
    .strata_cmd()
    .args(["build", "--strict"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("line 2: unknown directive `EXPOSE`"));
  assert!(env.calls("virt-builder").is_empty());
}

#[test]
#[serial]
fn build_json_output() {
  let env = TestEnv::with_script("BASE fedora-23\n");

  let out = env.strata_cmd().args(["build", "-o", "json"]).assert().success();
  let report: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
  assert_eq!(report["terminal"]["identity"], "fedora-23");
  assert_eq!(report["stats"]["built"], 1);
  assert!(report["duration_ms"].is_u64());
}
