//! Layers: immutable disk states and the arena that links them.
//!
//! A layer never owns its parent. Parents are referenced by [`LayerId`], an
//! index into the [`LayerArena`] of one build, so a parent can be shared by
//! any number of children.

mod identity;

pub use identity::{Identity, derive_name, is_valid_name};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::SnapshotBackend;
use crate::consts::INCOMPLETE_EXT;
use crate::script::Operation;
use crate::store::StoreError;

/// Handle to a layer inside a [`LayerArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LayerId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
  Base,
  Derived,
  Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
  pub identity: Identity,
  pub parent: Option<LayerId>,
  /// Where the disk lives. Only readable once materialization completed.
  pub location: PathBuf,
  pub kind: LayerKind,
  /// `KIND:argument` of the directive that produced this layer.
  pub directive: String,
}

impl Layer {
  /// Identity a child would get by applying `op` to this layer.
  pub fn derived_name(&self, op: &Operation) -> Identity {
    Identity::derive(&self.identity, op)
  }

  /// Whether a complete disk state is present at this layer's location.
  ///
  /// Only looks at the filesystem, never at disk contents.
  pub fn exists(&self) -> bool {
    self.location.is_file() && !self.incomplete_marker().exists()
  }

  /// Marker file present while the layer is being built.
  pub fn incomplete_marker(&self) -> PathBuf {
    self.location.with_extension(INCOMPLETE_EXT)
  }

  pub fn is_incomplete(&self) -> bool {
    self.incomplete_marker().exists()
  }

  /// Create this layer's disk as a copy-on-write child of `parent`.
  pub async fn materialize<S: SnapshotBackend>(&self, parent: &Layer, backend: &S) -> Result<(), StoreError> {
    if !parent.location.is_file() {
      return Err(StoreError::MissingParent(parent.location.clone()));
    }
    if non_empty_file(&self.location) {
      return Err(StoreError::AlreadyPresent(self.location.clone()));
    }
    if self.location.exists() {
      remove_file(&self.location)?;
    }
    debug!(identity = %self.identity, parent = %parent.identity, "creating backed snapshot");
    backend
      .create_backed_snapshot(&parent.location, &self.location)
      .await
      .map_err(StoreError::Backend)
  }

  pub(crate) fn mark_incomplete(&self) -> Result<(), StoreError> {
    let marker = self.incomplete_marker();
    fs::write(&marker, format!("{}\n", self.directive)).map_err(|source| StoreError::Io {
      action: "write",
      path: marker,
      source,
    })
  }

  pub(crate) fn clear_incomplete(&self) -> Result<(), StoreError> {
    remove_file(&self.incomplete_marker())
  }

  /// Remove the disk and its marker, if any.
  pub(crate) fn discard(&self) -> Result<(), StoreError> {
    if self.location.exists() {
      warn!(identity = %self.identity, path = %self.location.display(), "discarding existing disk");
      remove_file(&self.location)?;
    }
    self.clear_incomplete()
  }
}

fn non_empty_file(path: &Path) -> bool {
  fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn remove_file(path: &Path) -> Result<(), StoreError> {
  match fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(StoreError::Io {
      action: "remove",
      path: path.to_path_buf(),
      source,
    }),
  }
}

/// Append-only table of the layers touched by one build.
#[derive(Debug, Default)]
pub struct LayerArena {
  layers: Vec<Layer>,
}

impl LayerArena {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_base(&mut self, identity: Identity, location: PathBuf, directive: String) -> LayerId {
    self.push(Layer {
      identity,
      parent: None,
      location,
      kind: LayerKind::Base,
      directive,
    })
  }

  /// Add a child of `parent` with the given identity.
  pub fn derive(
    &mut self,
    parent: LayerId,
    identity: Identity,
    location: PathBuf,
    kind: LayerKind,
    directive: String,
  ) -> LayerId {
    self.push(Layer {
      identity,
      parent: Some(parent),
      location,
      kind,
      directive,
    })
  }

  fn push(&mut self, layer: Layer) -> LayerId {
    let id = LayerId(self.layers.len());
    self.layers.push(layer);
    id
  }

  pub fn get(&self, id: LayerId) -> &Layer {
    &self.layers[id.0]
  }

  /// Walk from `id` up to its base layer.
  pub fn ancestry(&self, id: LayerId) -> impl Iterator<Item = &Layer> {
    std::iter::successors(Some(self.get(id)), move |layer| layer.parent.map(|p| self.get(p)))
  }
}
