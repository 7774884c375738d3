//! Running tagged disks as virtual machines.
//!
//! A VM never boots a tag directly: each machine gets its own copy-on-write
//! instance disk on top of the tag, so tags stay immutable. The store records
//! which tag each instance disk is backed by, and refuses to replace or remove
//! a tag while an instance still uses it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{SnapshotBackend, ToolError, VmManager};
use crate::build::DEFAULT_LOCK_WAIT;
use crate::layer::is_valid_name;
use crate::store::{LayerStore, StoreError};

pub const DEFAULT_MEMORY_MIB: u32 = 1024;
pub const DEFAULT_VCPUS: u32 = 1;

/// Machine parameters handed to the VM manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineSpec {
  pub name: String,
  pub memory_mib: u32,
  pub vcpus: u32,
  pub metadata: BTreeMap<String, String>,
}

impl MachineSpec {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      memory_mib: DEFAULT_MEMORY_MIB,
      vcpus: DEFAULT_VCPUS,
      metadata: BTreeMap::new(),
    }
  }

  pub fn with_memory(mut self, memory_mib: u32) -> Self {
    self.memory_mib = memory_mib;
    self
  }

  pub fn with_vcpus(mut self, vcpus: u32) -> Self {
    self.vcpus = vcpus;
    self
  }

  pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
    self.metadata.insert(key.to_string(), value.to_string());
    self
  }

  /// Metadata rendered as `key=value; key=value`, if any.
  pub fn description(&self) -> Option<String> {
    if self.metadata.is_empty() {
      return None;
    }
    let pairs: Vec<String> = self.metadata.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    Some(pairs.join("; "))
  }
}

#[derive(Debug, Error)]
pub enum VmError {
  #[error("invalid machine name `{0}`")]
  InvalidName(String),

  #[error("tag `{0}` not found in store")]
  UnknownTag(String),

  #[error("machine `{0}` already has an instance disk")]
  InstanceExists(String),

  #[error("instance disk for `{name}`: {source}")]
  Storage { name: String, source: StoreError },

  #[error("failed to create vm `{name}`: {source}")]
  Create { name: String, source: ToolError },

  #[error("failed to attach to vm `{name}`: {source}")]
  Attach { name: String, source: ToolError },

  #[error("failed to destroy vm `{name}`: {source}")]
  Destroy { name: String, source: ToolError },
}

/// Create and start a VM named `spec.name` from the disk tagged `tag`.
///
/// # Returns
///
/// The path of the instance disk the VM runs on.
pub async fn launch<B>(backend: &B, store: &LayerStore, tag: &str, spec: &MachineSpec) -> Result<PathBuf, VmError>
where
  B: VmManager + SnapshotBackend,
{
  if !is_valid_name(&spec.name) {
    return Err(VmError::InvalidName(spec.name.clone()));
  }
  let storage = |source| VmError::Storage {
    name: spec.name.clone(),
    source,
  };

  let tag_layer = store
    .tag_layer(tag)
    .map_err(storage)?
    .ok_or_else(|| VmError::UnknownTag(tag.to_string()))?;

  let instance = store.instance_path(&spec.name);
  if instance.exists() {
    return Err(VmError::InstanceExists(spec.name.clone()));
  }

  // Held until the instance is recorded, so a concurrent retag or untag
  // either sees it or finishes first.
  let _lock = store
    .lock(&tag_layer, &format!("strata run {}", tag), DEFAULT_LOCK_WAIT)
    .await
    .map_err(storage)?;
  if !tag_layer.exists() {
    return Err(VmError::UnknownTag(tag.to_string()));
  }

  backend
    .create_backed_snapshot(&tag_layer.location, &instance)
    .await
    .map_err(|e| storage(StoreError::Backend(e)))?;
  if let Err(e) = store.record_instance(&spec.name, tag) {
    discard_instance(store, &spec.name);
    return Err(storage(e));
  }

  if let Err(source) = backend.create_vm(&instance, spec).await {
    discard_instance(store, &spec.name);
    return Err(VmError::Create {
      name: spec.name.clone(),
      source,
    });
  }

  info!(name = %spec.name, tag, disk = %instance.display(), "vm started");
  Ok(instance)
}

/// Attach an interactive console to a running VM.
pub async fn attach<B: VmManager>(backend: &B, name: &str) -> Result<(), VmError> {
  backend.attach_vm(name).await.map_err(|source| VmError::Attach {
    name: name.to_string(),
    source,
  })
}

/// Stop and undefine a VM, then delete its instance disk.
pub async fn destroy<B: VmManager>(backend: &B, store: &LayerStore, name: &str) -> Result<(), VmError> {
  if !is_valid_name(name) {
    return Err(VmError::InvalidName(name.to_string()));
  }
  backend.destroy_vm(name).await.map_err(|source| VmError::Destroy {
    name: name.to_string(),
    source,
  })?;

  let removed = store.remove_instance(name).map_err(|source| VmError::Storage {
    name: name.to_string(),
    source,
  })?;
  if removed {
    info!(name, "instance disk removed");
  }
  Ok(())
}

fn discard_instance(store: &LayerStore, name: &str) {
  if let Err(e) = store.remove_instance(name) {
    warn!(name, error = %e, "failed to remove instance disk");
  }
}
