//! Shared test helpers for CLI integration tests.
//!
//! Host tools are replaced by small shell scripts that log their arguments to
//! `calls.log` and write plain-text "disks".

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Marker that makes the fake guest executor fail.
pub const FAIL_MARKER: &str = "strata-test-fail";

/// Isolated test environment.
///
/// Each test gets its own store, fake toolchain and call log.
pub struct TestEnv {
  pub temp: TempDir,
  pub script_path: PathBuf,
}

impl TestEnv {
  /// Create an environment whose `Stratafile` holds `script`.
  pub fn with_script(script: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let script_path = temp.path().join("Stratafile");
    std::fs::write(&script_path, script).unwrap();
    let env = Self { temp, script_path };
    env.install_fake_tools();
    env
  }

  pub fn write_script(&self, script: &str) {
    std::fs::write(&self.script_path, script).unwrap();
  }

  /// Store path (isolated per test).
  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn bin_path(&self) -> PathBuf {
    self.temp.path().join("bin")
  }

  pub fn log_path(&self) -> PathBuf {
    self.temp.path().join("calls.log")
  }

  /// Logged invocations of `tool`, one entry per call.
  pub fn calls(&self, tool: &str) -> Vec<String> {
    let log = std::fs::read_to_string(self.log_path()).unwrap_or_default();
    let prefix = format!("{} ", tool);
    log.lines().filter(|l| l.starts_with(&prefix)).map(str::to_string).collect()
  }

  pub fn clear_calls(&self) {
    let _ = std::fs::remove_file(self.log_path());
  }

  fn install_fake_tools(&self) {
    let bin = self.bin_path();
    std::fs::create_dir_all(&bin).unwrap();
    let log = self.log_path();
    let log = log.display();

    // All tools take the output disk as their last argument.
    write_tool(
      &bin.join("virt-builder"),
      &format!("echo \"virt-builder $*\" >> '{log}'\nfor last; do :; done\necho \"base:$1\" > \"$last\"\n"),
    );
    write_tool(
      &bin.join("qemu-img"),
      &format!(
        "echo \"qemu-img $*\" >> '{log}'\nfor last; do :; done\n\
         parent=\"$7\"\n[ -f \"$parent\" ] || {{ echo \"missing backing file $parent\" >&2; exit 1; }}\n\
         echo \"backing:$parent\" > \"$last\"\n"
      ),
    );
    write_tool(
      &bin.join("virt-customize"),
      &format!(
        "echo \"virt-customize $*\" >> '{log}'\n\
         case \"$*\" in *{FAIL_MARKER}*) echo 'command exited with status 42' >&2; exit 1;; esac\n\
         echo \"$*\" >> \"$2\"\n"
      ),
    );
    write_tool(&bin.join("virt-install"), &format!("echo \"virt-install $*\" >> '{log}'\n"));
    write_tool(
      &bin.join("virsh"),
      &format!(
        "echo \"virsh $*\" >> '{log}'\n\
         if [ \"$1\" = destroy ]; then echo \"error: domain is not running\" >&2; exit 1; fi\n"
      ),
    );
  }

  /// A strata command wired to the isolated store and fake tools.
  pub fn strata_cmd(&self) -> Command {
    let bin = self.bin_path();
    let mut cmd: Command = cargo_bin_cmd!("strata");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("RUST_LOG");
    cmd.env("STRATA_STORE", self.store_path());
    cmd.env("STRATA_VIRT_BUILDER", bin.join("virt-builder"));
    cmd.env("STRATA_QEMU_IMG", bin.join("qemu-img"));
    cmd.env("STRATA_VIRT_CUSTOMIZE", bin.join("virt-customize"));
    cmd.env("STRATA_VIRT_INSTALL", bin.join("virt-install"));
    cmd.env("STRATA_VIRSH", bin.join("virsh"));
    cmd
  }
}

fn write_tool(path: &Path, body: &str) {
  std::fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
  let mut perms = std::fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(path, perms).unwrap();
}
