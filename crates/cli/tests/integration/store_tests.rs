//! `ls` and `untag` integration tests.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
#[serial]
fn ls_shows_layers_and_tags() {
  let env = TestEnv::with_script("BASE fedora-23\nMUTATE echo hi\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();

  env
    .strata_cmd()
    .arg("ls")
    .assert()
    .success()
    .stdout(predicate::str::contains("fedora-23"))
    .stdout(predicate::str::contains("web"));

  let out = env.strata_cmd().args(["ls", "-o", "json"]).assert().success();
  let disks: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
  let disks = disks.as_array().unwrap();
  assert_eq!(disks.len(), 3);
  assert_eq!(disks[0]["kind"], "derived");
  assert_eq!(disks[1]["name"], "fedora-23");
  assert_eq!(disks[1]["kind"], "base");
  assert_eq!(disks[2]["kind"], "tag");
  assert!(disks.iter().all(|d| d["complete"] == true));
}

#[test]
#[serial]
fn untag_removes_only_the_tag() {
  let env = TestEnv::with_script("BASE fedora-23\nMUTATE echo hi\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();

  env
    .strata_cmd()
    .args(["untag", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed tag web"));

  assert!(!env.store_path().join("tags/web.qcow2").exists());

  // Layers are still cached.
  env.clear_calls();
  env.strata_cmd().arg("build").assert().success();
  assert!(env.calls("qemu-img").is_empty());
}

#[test]
#[serial]
fn untag_refuses_while_a_machine_runs_on_it() {
  let env = TestEnv::with_script("BASE fedora-23\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();
  env.strata_cmd().args(["run", "web", "--name", "web-1"]).assert().success();

  env
    .strata_cmd()
    .args(["untag", "web"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("web-1"));
  assert!(env.store_path().join("tags/web.qcow2").is_file());

  env.strata_cmd().args(["destroy", "web-1"]).assert().success();
  env.strata_cmd().args(["untag", "web"]).assert().success();
}
