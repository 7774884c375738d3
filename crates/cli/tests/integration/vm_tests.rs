//! `run`, `destroy` integration tests.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
#[serial]
fn run_boots_an_overlay_of_the_tag() {
  let env = TestEnv::with_script("BASE fedora-23\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();
  env.clear_calls();

  env
    .strata_cmd()
    .args(["run", "web", "--name", "web-1", "--memory", "2048", "--meta", "tier=front"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Started web-1 from tag web"));

  let install = env.calls("virt-install");
  assert_eq!(install.len(), 1);
  assert!(install[0].contains("--name web-1"));
  assert!(install[0].contains("--memory 2048"));
  assert!(install[0].contains("description=tier=front"));
  assert!(install[0].contains("instances/web-1.qcow2"));
  assert!(env.store_path().join("instances/web-1.qcow2").is_file());
}

#[test]
#[serial]
fn run_unknown_tag_fails() {
  let env = TestEnv::with_script("BASE fedora-23\n");

  env
    .strata_cmd()
    .args(["run", "missing", "--name", "m"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("tag `missing` not found"));
  assert!(env.calls("virt-install").is_empty());
}

#[test]
#[serial]
fn destroy_tolerates_stopped_domain() {
  let env = TestEnv::with_script("BASE fedora-23\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();
  env.strata_cmd().args(["run", "web", "--name", "web-1"]).assert().success();

  env
    .strata_cmd()
    .args(["destroy", "web-1"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Destroyed web-1"));

  let virsh = env.calls("virsh");
  assert_eq!(virsh, vec!["virsh destroy web-1".to_string(), "virsh undefine web-1".to_string()]);
  assert!(!env.store_path().join("instances/web-1.qcow2").exists());
}

#[test]
#[serial]
fn retag_refuses_while_a_machine_runs_on_it() {
  let env = TestEnv::with_script("BASE fedora-23\nMUTATE echo one\n");
  env.strata_cmd().args(["build", "--tag", "web"]).assert().success();
  env.strata_cmd().args(["run", "web", "--name", "web-1"]).assert().success();
  let tag = env.store_path().join("tags/web.qcow2");
  let before = std::fs::read(&tag).unwrap();

  env.write_script("BASE fedora-23\nMUTATE echo two\n");
  env
    .strata_cmd()
    .args(["build", "--tag", "web"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("web-1"));
  assert_eq!(std::fs::read(&tag).unwrap(), before);
}
