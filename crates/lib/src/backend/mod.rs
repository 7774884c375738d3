//! External collaborators.
//!
//! The core never reads or writes disk images itself. Every side effect goes
//! through the traits below. [`Toolchain`] implements all of them by spawning
//! the usual libguestfs/qemu/libvirt host tools.

mod process;
mod toolchain;

pub use process::{run_interactive, run_tool};
pub use toolchain::{Toolchain, ToolchainConfig};

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::vm::MachineSpec;

/// A single instruction for the in-guest executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestCommand {
  /// Run a shell command inside the guest.
  Shell(String),
  /// Write `content` to `path` inside the guest.
  WriteFile { path: String, content: String },
}

/// Failure reported by an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
  #[error("failed to spawn `{program}`: {source}")]
  Spawn { program: String, source: io::Error },

  #[error("`{program}` exited with code {code:?}: {stderr}")]
  Failed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("`{program}` timed out after {after:?}")]
  Timeout { program: String, after: Duration },
}

/// Creates a base disk from a well-known image template.
pub trait ImageMaterializer {
  /// Only called when `dest` does not already hold a complete disk.
  fn materialize(&self, template: &str, format: &str, dest: &Path) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Creates copy-on-write disks.
pub trait SnapshotBackend {
  /// Create `new` as a disk that stores only its delta from `parent`.
  fn create_backed_snapshot(&self, parent: &Path, new: &Path) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Runs commands inside a disk image, with guest networking attached.
pub trait GuestExecutor {
  fn execute(&self, target: &Path, command: &GuestCommand) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Creates, attaches to, and destroys virtual machines.
pub trait VmManager {
  fn create_vm(&self, disk: &Path, spec: &MachineSpec) -> impl Future<Output = Result<(), ToolError>> + Send;

  /// Attach an interactive console. Blocks until the console exits.
  fn attach_vm(&self, name: &str) -> impl Future<Output = Result<(), ToolError>> + Send;

  /// Stop the VM and remove its definition.
  fn destroy_vm(&self, name: &str) -> impl Future<Output = Result<(), ToolError>> + Send;
}

/// Everything a build needs.
pub trait Backend: ImageMaterializer + SnapshotBackend + GuestExecutor + Sync {}

impl<T: ImageMaterializer + SnapshotBackend + GuestExecutor + Sync> Backend for T {}
