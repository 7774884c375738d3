//! The layer store: a directory where existence on disk is the cache index.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── layers/                 # base and derived layers, by identity
//! │   ├── fedora-23.qcow2
//! │   ├── <hash>.qcow2
//! │   └── <hash>.incomplete   # present while (or if failed while) building
//! ├── tags/                   # human-named snapshots of terminal layers
//! │   └── <name>.qcow2
//! ├── instances/              # per-VM overlays on top of tags
//! │   ├── <name>.qcow2
//! │   └── <name>.tag          # name of the backing tag
//! └── locks/
//!     ├── layers/<identity>.lock
//!     └── tags/<name>.lock
//! ```

pub mod lock;

pub use lock::{LayerLock, LockError, LockMetadata};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::backend::ToolError;
use crate::consts::{DISK_FORMAT, INCOMPLETE_EXT, INSTANCE_TAG_EXT, INSTANCES_DIR, LAYERS_DIR, LOCKS_DIR, TAGS_DIR};
use crate::layer::{Identity, Layer, LayerKind, is_valid_name};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create store directory {path}: {source}")]
  CreateDir { path: PathBuf, source: io::Error },

  #[error("parent layer missing at {0}")]
  MissingParent(PathBuf),

  #[error("layer already present at {0}")]
  AlreadyPresent(PathBuf),

  #[error("disk backend failed: {0}")]
  Backend(#[source] ToolError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error("failed to {action} {path}: {source}")]
  Io {
    action: &'static str,
    path: PathBuf,
    source: io::Error,
  },

  #[error("invalid name `{0}`")]
  InvalidName(String),

  #[error("tag `{0}` not found")]
  TagNotFound(String),

  #[error("tag `{tag}` backs the instance disk of {}; destroy first", .machines.join(", "))]
  TagInUse { tag: String, machines: Vec<String> },
}

/// One disk found in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDisk {
  pub name: String,
  pub kind: LayerKind,
  pub path: PathBuf,
  pub size_bytes: u64,
  pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct LayerStore {
  root: PathBuf,
}

impl LayerStore {
  /// Open (and create if needed) the store at `root`.
  ///
  /// The root is made absolute because layer paths end up recorded as backing
  /// files inside child disks.
  pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
    let root = std::path::absolute(root.as_ref()).map_err(|source| StoreError::CreateDir {
      path: root.as_ref().to_path_buf(),
      source,
    })?;
    for dir in [LAYERS_DIR, TAGS_DIR, INSTANCES_DIR, LOCKS_DIR] {
      let path = root.join(dir);
      fs::create_dir_all(&path).map_err(|source| StoreError::CreateDir { path, source })?;
    }
    Ok(Self { root })
  }

  /// Open the store at `root` for lookups only. Nothing is created, and a
  /// missing store reads as empty.
  pub fn open_read_only(root: impl AsRef<Path>) -> Result<Self, StoreError> {
    let root = std::path::absolute(root.as_ref()).map_err(|source| StoreError::Io {
      action: "resolve",
      path: root.as_ref().to_path_buf(),
      source,
    })?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn layer_path(&self, identity: &Identity) -> PathBuf {
    self.root.join(LAYERS_DIR).join(disk_file_name(identity.as_str()))
  }

  pub fn tag_path(&self, name: &str) -> PathBuf {
    self.root.join(TAGS_DIR).join(disk_file_name(name))
  }

  pub fn instance_path(&self, name: &str) -> PathBuf {
    self.root.join(INSTANCES_DIR).join(disk_file_name(name))
  }

  fn instance_tag_path(&self, name: &str) -> PathBuf {
    self.root.join(INSTANCES_DIR).join(format!("{}.{}", name, INSTANCE_TAG_EXT))
  }

  fn lock_path(&self, layer: &Layer) -> PathBuf {
    let namespace = match layer.kind {
      LayerKind::Tag => TAGS_DIR,
      LayerKind::Base | LayerKind::Derived => LAYERS_DIR,
    };
    self
      .root
      .join(LOCKS_DIR)
      .join(namespace)
      .join(format!("{}.lock", layer.identity))
  }

  /// Take the exclusive build lock for `layer`.
  pub async fn lock(&self, layer: &Layer, command: &str, wait: Duration) -> Result<LayerLock, StoreError> {
    let path = self.lock_path(layer);
    Ok(LayerLock::acquire(&path, layer.identity.as_str(), command, wait).await?)
  }

  /// The tag named `name` as a standalone layer, if it exists.
  pub fn tag_layer(&self, name: &str) -> Result<Option<Layer>, StoreError> {
    if !is_valid_name(name) {
      return Err(StoreError::InvalidName(name.to_string()));
    }
    let layer = Layer {
      identity: Identity::named(name),
      parent: None,
      location: self.tag_path(name),
      kind: LayerKind::Tag,
      directive: format!("TAG:{}", name),
    };
    Ok(layer.exists().then_some(layer))
  }

  /// Delete a tag's disk.
  ///
  /// Refused while an instance disk is backed by the tag.
  pub async fn remove_tag(&self, name: &str, command: &str, wait: Duration) -> Result<(), StoreError> {
    let layer = self.tag_layer(name)?.ok_or_else(|| StoreError::TagNotFound(name.to_string()))?;
    let _lock = self.lock(&layer, command, wait).await?;
    self.ensure_tag_unused(name)?;
    layer.discard()?;
    info!(tag = name, "tag removed");
    Ok(())
  }

  /// Machines whose instance disk is backed by `tag`, sorted by name.
  pub fn instances_of(&self, tag: &str) -> Result<Vec<String>, StoreError> {
    let dir = self.root.join(INSTANCES_DIR);
    let entries = match fs::read_dir(&dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StoreError::Io {
          action: "read",
          path: dir,
          source,
        });
      }
    };

    let mut machines = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some(INSTANCE_TAG_EXT) {
        continue;
      }
      let Some(machine) = path.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      // A record without its disk is stale.
      if !self.instance_path(machine).is_file() {
        continue;
      }
      let backing = fs::read_to_string(&path).map_err(|source| StoreError::Io {
        action: "read",
        path: path.clone(),
        source,
      })?;
      if backing.trim() == tag {
        machines.push(machine.to_string());
      }
    }
    machines.sort();
    Ok(machines)
  }

  /// Fail if replacing or removing `tag` would pull the disk out from under
  /// a machine.
  pub(crate) fn ensure_tag_unused(&self, tag: &str) -> Result<(), StoreError> {
    let machines = self.instances_of(tag)?;
    if machines.is_empty() {
      Ok(())
    } else {
      Err(StoreError::TagInUse {
        tag: tag.to_string(),
        machines,
      })
    }
  }

  /// Note that the instance disk of `machine` is backed by `tag`.
  pub(crate) fn record_instance(&self, machine: &str, tag: &str) -> Result<(), StoreError> {
    let path = self.instance_tag_path(machine);
    fs::write(&path, format!("{}\n", tag)).map_err(|source| StoreError::Io {
      action: "write",
      path,
      source,
    })
  }

  /// Delete the instance disk of `machine` and its backing record.
  ///
  /// Returns whether a disk was present.
  pub(crate) fn remove_instance(&self, machine: &str) -> Result<bool, StoreError> {
    let disk = self.instance_path(machine);
    let existed = disk.is_file();
    for path in [disk, self.instance_tag_path(machine)] {
      match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
          return Err(StoreError::Io {
            action: "remove",
            path,
            source,
          });
        }
      }
    }
    Ok(existed)
  }

  /// Every layer and tag disk in the store, sorted by kind then name.
  pub fn list(&self) -> Result<Vec<StoredDisk>, StoreError> {
    let mut disks = Vec::new();
    self.scan(&self.root.join(LAYERS_DIR), false, &mut disks)?;
    self.scan(&self.root.join(TAGS_DIR), true, &mut disks)?;
    disks.sort_by(|a, b| (a.kind == LayerKind::Tag, &a.name).cmp(&(b.kind == LayerKind::Tag, &b.name)));
    Ok(disks)
  }

  fn scan(&self, dir: &Path, tags: bool, out: &mut Vec<StoredDisk>) -> Result<(), StoreError> {
    let entries = match fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(source) => {
        return Err(StoreError::Io {
          action: "read",
          path: dir.to_path_buf(),
          source,
        });
      }
    };

    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some(DISK_FORMAT) {
        continue;
      }
      let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
        continue;
      };
      let kind = if tags {
        LayerKind::Tag
      } else if Identity::named(&name).is_digest() {
        LayerKind::Derived
      } else {
        LayerKind::Base
      };
      let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
      let complete = !path.with_extension(INCOMPLETE_EXT).exists();
      out.push(StoredDisk {
        name,
        kind,
        path,
        size_bytes,
        complete,
      });
    }
    Ok(())
  }
}

fn disk_file_name(name: &str) -> String {
  format!("{}.{}", name, DISK_FORMAT)
}
