//! Folding operations into a chain of layers.

use tracing::{debug, info};

use super::types::{BuildConfig, BuildError, BuildOutcome, BuildStats, StepReport, StepStatus};
use crate::backend::Backend;
use crate::layer::{Identity, Layer, LayerArena, LayerId, LayerKind, is_valid_name};
use crate::script::{ApplyError, Operation, ScriptError};
use crate::store::LayerStore;

/// The state of one build invocation.
///
/// Starts empty, accepts a single `BASE`, then derives one layer per
/// operation. Never persisted: the store is the only cache.
pub struct BuildContext<'a, B: Backend> {
  store: &'a LayerStore,
  backend: &'a B,
  config: &'a BuildConfig,
  arena: LayerArena,
  chain: Vec<LayerId>,
  steps: Vec<StepReport>,
  stats: BuildStats,
  tag: Option<String>,
}

impl<'a, B: Backend> BuildContext<'a, B> {
  pub fn new(store: &'a LayerStore, backend: &'a B, config: &'a BuildConfig) -> Self {
    Self {
      store,
      backend,
      config,
      arena: LayerArena::new(),
      chain: Vec::new(),
      steps: Vec::new(),
      stats: BuildStats::default(),
      tag: None,
    }
  }

  /// The layer the next operation builds on, if any.
  pub fn current(&self) -> Option<&Layer> {
    self.chain.last().map(|id| self.arena.get(*id))
  }

  /// Every layer of the chain in script order.
  pub fn chain(&self) -> impl Iterator<Item = &Layer> {
    self.chain.iter().map(|id| self.arena.get(*id))
  }

  pub fn stats(&self) -> BuildStats {
    self.stats
  }

  /// Fold one operation into the chain.
  pub async fn apply_one(&mut self, op: &Operation) -> Result<LayerId, BuildError> {
    let id = match self.chain.last().copied() {
      None => self.apply_base(op).await?,
      Some(parent) => self.apply_derived(parent, op).await?,
    };
    self.chain.push(id);
    Ok(id)
  }

  pub async fn apply_all(&mut self, ops: &[Operation]) -> Result<(), BuildError> {
    for op in ops {
      self.apply_one(op).await?;
    }
    Ok(())
  }

  async fn apply_base(&mut self, op: &Operation) -> Result<LayerId, BuildError> {
    let Operation::Base { reference } = op else {
      return Err(ScriptError::MissingBase(op.descriptor()).into());
    };
    let identity =
      Identity::base(reference).ok_or_else(|| ScriptError::EmptyBaseReference(reference.clone()))?;
    let location = self.store.layer_path(&identity);
    let id = self.arena.insert_base(identity, location, op.descriptor());
    let layer = self.arena.get(id).clone();

    if layer.exists() {
      info!(identity = %layer.identity, "base image cached");
      self.record(&layer, StepStatus::Cached);
      return Ok(id);
    }

    let _lock = self
      .store
      .lock(&layer, &self.config.command, self.config.lock_wait)
      .await
      .map_err(|e| BuildError::storage(&layer, e))?;

    if layer.exists() {
      info!(identity = %layer.identity, "base image built concurrently");
      self.record(&layer, StepStatus::Cached);
      return Ok(id);
    }

    layer.discard().map_err(|e| BuildError::storage(&layer, e))?;
    layer.mark_incomplete().map_err(|e| BuildError::storage(&layer, e))?;
    op.apply(&layer, self.backend).await.map_err(|e| apply_error(&layer, e))?;
    layer.clear_incomplete().map_err(|e| BuildError::storage(&layer, e))?;

    self.record(&layer, StepStatus::Built);
    Ok(id)
  }

  async fn apply_derived(&mut self, parent: LayerId, op: &Operation) -> Result<LayerId, BuildError> {
    if op.is_base() {
      return Err(ScriptError::RepeatedBase(op.descriptor()).into());
    }
    let parent_layer = self.arena.get(parent).clone();
    let identity = parent_layer.derived_name(op);
    let location = self.store.layer_path(&identity);
    let id = self
      .arena
      .derive(parent, identity, location, LayerKind::Derived, op.descriptor());
    let layer = self.arena.get(id).clone();

    if !self.config.force_rebuild && layer.exists() {
      info!(identity = %layer.identity, directive = %layer.directive, "cache hit");
      self.record(&layer, StepStatus::Cached);
      return Ok(id);
    }

    // A concurrent build may finish this identity while we wait, so check
    // again under the lock.
    let _lock = self
      .store
      .lock(&layer, &self.config.command, self.config.lock_wait)
      .await
      .map_err(|e| BuildError::storage(&layer, e))?;

    if !self.config.force_rebuild && layer.exists() {
      info!(identity = %layer.identity, directive = %layer.directive, "built concurrently");
      self.record(&layer, StepStatus::Cached);
      return Ok(id);
    }

    info!(identity = %layer.identity, directive = %layer.directive, "building layer");
    layer.discard().map_err(|e| BuildError::storage(&layer, e))?;
    layer.mark_incomplete().map_err(|e| BuildError::storage(&layer, e))?;
    layer
      .materialize(&parent_layer, self.backend)
      .await
      .map_err(|e| BuildError::storage(&layer, e))?;
    op.apply(&layer, self.backend).await.map_err(|e| apply_error(&layer, e))?;
    layer.clear_incomplete().map_err(|e| BuildError::storage(&layer, e))?;

    self.record(&layer, StepStatus::Built);
    Ok(id)
  }

  /// Snapshot the terminal layer under a human-readable name.
  ///
  /// Replaces any existing tag with the same name, unless an instance disk is
  /// still backed by it.
  pub async fn tag(&mut self, name: &str) -> Result<String, BuildError> {
    if !is_valid_name(name) {
      return Err(ScriptError::InvalidTag(name.to_string()).into());
    }
    let terminal = *self.chain.last().ok_or(ScriptError::NothingToTag)?;
    let terminal_layer = self.arena.get(terminal).clone();
    let id = self.arena.derive(
      terminal,
      Identity::named(name),
      self.store.tag_path(name),
      LayerKind::Tag,
      format!("TAG:{}", name),
    );
    let layer = self.arena.get(id).clone();

    let _lock = self
      .store
      .lock(&layer, &self.config.command, self.config.lock_wait)
      .await
      .map_err(|e| BuildError::storage(&layer, e))?;

    self
      .store
      .ensure_tag_unused(name)
      .map_err(|e| BuildError::storage(&layer, e))?;
    layer.discard().map_err(|e| BuildError::storage(&layer, e))?;
    layer.mark_incomplete().map_err(|e| BuildError::storage(&layer, e))?;
    layer
      .materialize(&terminal_layer, self.backend)
      .await
      .map_err(|e| BuildError::storage(&layer, e))?;
    layer.clear_incomplete().map_err(|e| BuildError::storage(&layer, e))?;

    info!(tag = name, identity = %terminal_layer.identity, "tagged");
    self.tag = Some(name.to_string());
    Ok(name.to_string())
  }

  /// Close the build and report what happened.
  pub fn finish(self) -> Result<BuildOutcome, BuildError> {
    let terminal = *self.chain.last().ok_or(ScriptError::Empty)?;
    Ok(BuildOutcome {
      terminal: self.arena.get(terminal).clone(),
      steps: self.steps,
      tag: self.tag,
      stats: self.stats,
      warnings: Vec::new(),
    })
  }

  fn record(&mut self, layer: &Layer, status: StepStatus) {
    debug!(identity = %layer.identity, ?status, "step done");
    match status {
      StepStatus::Cached => self.stats.cached += 1,
      StepStatus::Built => self.stats.built += 1,
    }
    self.steps.push(StepReport {
      directive: layer.directive.clone(),
      identity: layer.identity.clone(),
      status,
    });
  }
}

fn apply_error(layer: &Layer, err: ApplyError) -> BuildError {
  match err {
    ApplyError::Storage(source) => BuildError::storage(layer, source),
    ApplyError::Executor(source) => BuildError::executor(layer, source),
  }
}
