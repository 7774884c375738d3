//! Test doubles for strata-lib.
//!
//! [`FakeBackend`] stands in for the host toolchain. Disks are plain text
//! files so tests can assert on what happened to them.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backend::{GuestCommand, GuestExecutor, ImageMaterializer, SnapshotBackend, ToolError, VmManager};
use crate::vm::MachineSpec;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  Materialize { template: String, dest: PathBuf },
  Snapshot { parent: PathBuf, new: PathBuf },
  Execute { target: PathBuf, command: GuestCommand },
  CreateVm { name: String, disk: PathBuf },
  AttachVm { name: String },
  DestroyVm { name: String },
}

#[derive(Debug, Default)]
pub struct FakeBackend {
  calls: Mutex<Vec<Call>>,
  fail_on: Option<String>,
  fail_vm_create: bool,
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail any shell command containing `needle`.
  pub fn failing_on(needle: &str) -> Self {
    Self {
      fail_on: Some(needle.to_string()),
      ..Self::default()
    }
  }

  pub fn fail_vm_create(mut self) -> Self {
    self.fail_vm_create = true;
    self
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn materialize_count(&self) -> usize {
    self.count(|c| matches!(c, Call::Materialize { .. }))
  }

  pub fn snapshot_count(&self) -> usize {
    self.count(|c| matches!(c, Call::Snapshot { .. }))
  }

  pub fn execute_count(&self) -> usize {
    self.count(|c| matches!(c, Call::Execute { .. }))
  }

  /// Shell commands executed, in order.
  pub fn shell_commands(&self) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Execute {
          command: GuestCommand::Shell(cmd),
          ..
        } => Some(cmd),
        _ => None,
      })
      .collect()
  }

  fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
  }

  fn record(&self, call: Call) {
    self.calls.lock().unwrap().push(call);
  }
}

fn failed(program: &str, stderr: impl Into<String>) -> ToolError {
  ToolError::Failed {
    program: program.to_string(),
    code: Some(1),
    stderr: stderr.into(),
  }
}

fn io_failed(program: &str, e: io::Error) -> ToolError {
  failed(program, e.to_string())
}

impl ImageMaterializer for FakeBackend {
  async fn materialize(&self, template: &str, _format: &str, dest: &Path) -> Result<(), ToolError> {
    self.record(Call::Materialize {
      template: template.to_string(),
      dest: dest.to_path_buf(),
    });
    fs::write(dest, format!("base:{}\n", template)).map_err(|e| io_failed("fake-builder", e))
  }
}

impl SnapshotBackend for FakeBackend {
  async fn create_backed_snapshot(&self, parent: &Path, new: &Path) -> Result<(), ToolError> {
    self.record(Call::Snapshot {
      parent: parent.to_path_buf(),
      new: new.to_path_buf(),
    });
    if !parent.is_file() {
      return Err(failed("fake-img", format!("missing backing file {}", parent.display())));
    }
    if fs::metadata(new).map(|m| m.len() > 0).unwrap_or(false) {
      return Err(failed("fake-img", format!("{} already exists", new.display())));
    }
    fs::write(new, format!("backing:{}\n", parent.display())).map_err(|e| io_failed("fake-img", e))
  }
}

impl GuestExecutor for FakeBackend {
  async fn execute(&self, target: &Path, command: &GuestCommand) -> Result<(), ToolError> {
    self.record(Call::Execute {
      target: target.to_path_buf(),
      command: command.clone(),
    });
    let line = match command {
      GuestCommand::Shell(cmd) => {
        if let Some(needle) = &self.fail_on
          && cmd.contains(needle.as_str())
        {
          return Err(failed("fake-customize", format!("command failed: {}", cmd)));
        }
        format!("run:{}\n", cmd)
      }
      GuestCommand::WriteFile { path, .. } => format!("write:{}\n", path),
    };
    let mut file = OpenOptions::new()
      .append(true)
      .open(target)
      .map_err(|e| io_failed("fake-customize", e))?;
    file.write_all(line.as_bytes()).map_err(|e| io_failed("fake-customize", e))
  }
}

impl VmManager for FakeBackend {
  async fn create_vm(&self, disk: &Path, spec: &MachineSpec) -> Result<(), ToolError> {
    self.record(Call::CreateVm {
      name: spec.name.clone(),
      disk: disk.to_path_buf(),
    });
    if self.fail_vm_create {
      return Err(failed("fake-install", "domain already exists"));
    }
    Ok(())
  }

  async fn attach_vm(&self, name: &str) -> Result<(), ToolError> {
    self.record(Call::AttachVm { name: name.to_string() });
    Ok(())
  }

  async fn destroy_vm(&self, name: &str) -> Result<(), ToolError> {
    self.record(Call::DestroyVm { name: name.to_string() });
    Ok(())
  }
}
