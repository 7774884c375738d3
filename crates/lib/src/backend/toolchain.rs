//! Host-tool implementations of the collaborator traits.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::process::{run_interactive, run_tool};
use super::{GuestCommand, GuestExecutor, ImageMaterializer, SnapshotBackend, ToolError, VmManager};
use crate::consts::DISK_FORMAT;
use crate::vm::MachineSpec;

/// Which binaries to run, and how long to let each call take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
  pub virt_builder: String,
  pub qemu_img: String,
  pub virt_customize: String,
  pub virt_install: String,
  pub virsh: String,
  /// Applied to every non-interactive call. `None` waits forever.
  pub timeout: Option<Duration>,
}

impl Default for ToolchainConfig {
  fn default() -> Self {
    Self {
      virt_builder: "virt-builder".to_string(),
      qemu_img: "qemu-img".to_string(),
      virt_customize: "virt-customize".to_string(),
      virt_install: "virt-install".to_string(),
      virsh: "virsh".to_string(),
      timeout: None,
    }
  }
}

impl ToolchainConfig {
  /// Defaults overridden by `STRATA_VIRT_BUILDER`, `STRATA_QEMU_IMG`,
  /// `STRATA_VIRT_CUSTOMIZE`, `STRATA_VIRT_INSTALL`, `STRATA_VIRSH` and
  /// `STRATA_TOOL_TIMEOUT` (whole seconds).
  pub fn from_env() -> Self {
    let mut config = Self::default();
    for (var, slot) in [
      ("STRATA_VIRT_BUILDER", &mut config.virt_builder),
      ("STRATA_QEMU_IMG", &mut config.qemu_img),
      ("STRATA_VIRT_CUSTOMIZE", &mut config.virt_customize),
      ("STRATA_VIRT_INSTALL", &mut config.virt_install),
      ("STRATA_VIRSH", &mut config.virsh),
    ] {
      if let Ok(value) = std::env::var(var)
        && !value.is_empty()
      {
        *slot = value;
      }
    }
    if let Some(secs) = std::env::var("STRATA_TOOL_TIMEOUT")
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .filter(|secs| *secs > 0)
    {
      config.timeout = Some(Duration::from_secs(secs));
    }
    config
  }
}

#[derive(Debug, Clone, Default)]
pub struct Toolchain {
  config: ToolchainConfig,
}

impl Toolchain {
  pub fn new(config: ToolchainConfig) -> Self {
    Self { config }
  }
}

impl ImageMaterializer for Toolchain {
  async fn materialize(&self, template: &str, format: &str, dest: &Path) -> Result<(), ToolError> {
    let args = [
      OsStr::new(template),
      OsStr::new("--format"),
      OsStr::new(format),
      OsStr::new("-o"),
      dest.as_os_str(),
    ];
    run_tool(&self.config.virt_builder, args, self.config.timeout).await?;
    Ok(())
  }
}

impl SnapshotBackend for Toolchain {
  async fn create_backed_snapshot(&self, parent: &Path, new: &Path) -> Result<(), ToolError> {
    let args = [
      OsStr::new("create"),
      OsStr::new("-f"),
      OsStr::new(DISK_FORMAT),
      OsStr::new("-F"),
      OsStr::new(DISK_FORMAT),
      OsStr::new("-b"),
      parent.as_os_str(),
      new.as_os_str(),
    ];
    run_tool(&self.config.qemu_img, args, self.config.timeout).await?;
    Ok(())
  }
}

impl GuestExecutor for Toolchain {
  async fn execute(&self, target: &Path, command: &GuestCommand) -> Result<(), ToolError> {
    let mut args: Vec<OsString> = vec![
      "-a".into(),
      target.as_os_str().to_os_string(),
      "--format".into(),
      DISK_FORMAT.into(),
      "--network".into(),
    ];
    match command {
      GuestCommand::Shell(cmd) => {
        args.push("--run-command".into());
        args.push(cmd.into());
      }
      GuestCommand::WriteFile { path, content } => {
        args.push("--write".into());
        args.push(format!("{}:{}", path, content).into());
      }
    }
    run_tool(&self.config.virt_customize, args, self.config.timeout).await?;
    Ok(())
  }
}

impl VmManager for Toolchain {
  async fn create_vm(&self, disk: &Path, spec: &MachineSpec) -> Result<(), ToolError> {
    let mut args: Vec<OsString> = vec![
      "--name".into(),
      spec.name.clone().into(),
      "--memory".into(),
      spec.memory_mib.to_string().into(),
      "--vcpus".into(),
      spec.vcpus.to_string().into(),
      "--disk".into(),
      format!("path={},format={}", escape_option(&disk.to_string_lossy()), DISK_FORMAT).into(),
      "--import".into(),
      "--noautoconsole".into(),
      "--os-variant".into(),
      "detect=on,require=off".into(),
    ];
    if let Some(description) = spec.description() {
      args.push("--metadata".into());
      args.push(format!("description={}", escape_option(&description)).into());
    }
    run_tool(&self.config.virt_install, args, self.config.timeout).await?;
    Ok(())
  }

  async fn attach_vm(&self, name: &str) -> Result<(), ToolError> {
    run_interactive(&self.config.virsh, ["console", name]).await
  }

  async fn destroy_vm(&self, name: &str) -> Result<(), ToolError> {
    match run_tool(&self.config.virsh, ["destroy", name], self.config.timeout).await {
      Ok(_) => {}
      Err(ToolError::Failed { stderr, .. }) if stderr.contains("not running") => {
        debug!(name, "domain already stopped");
      }
      Err(e) => return Err(e),
    }
    run_tool(&self.config.virsh, ["undefine", name], self.config.timeout).await?;
    Ok(())
  }
}

/// virt-install splits sub-options on `,`; a literal comma is written `,,`.
fn escape_option(value: &str) -> String {
  value.replace(',', ",,")
}
