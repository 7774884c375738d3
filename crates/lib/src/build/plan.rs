//! Dry run: compute every identity without touching the backend.

use serde::Serialize;

use crate::layer::{Identity, LayerArena, LayerId, LayerKind};
use crate::script::{Operation, ScriptError};
use crate::store::LayerStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
  pub directive: String,
  pub identity: Identity,
  /// A complete disk for this identity is already in the store.
  pub cached: bool,
}

/// Walk `ops` the way a build would and report what is already cached.
///
/// Applies the same ordering rules as a build: one `BASE`, first.
pub fn plan(ops: &[Operation], store: &LayerStore) -> Result<Vec<PlannedStep>, ScriptError> {
  let (first, rest) = ops.split_first().ok_or(ScriptError::Empty)?;
  let Operation::Base { reference } = first else {
    return Err(ScriptError::MissingBase(first.descriptor()));
  };
  let identity = Identity::base(reference).ok_or_else(|| ScriptError::EmptyBaseReference(reference.clone()))?;

  let mut arena = LayerArena::new();
  let location = store.layer_path(&identity);
  let mut current = arena.insert_base(identity, location, first.descriptor());
  let mut steps = vec![step(&arena, current)];

  for op in rest {
    if op.is_base() {
      return Err(ScriptError::RepeatedBase(op.descriptor()));
    }
    let identity = arena.get(current).derived_name(op);
    let location = store.layer_path(&identity);
    current = arena.derive(current, identity, location, LayerKind::Derived, op.descriptor());
    steps.push(step(&arena, current));
  }
  Ok(steps)
}

fn step(arena: &LayerArena, id: LayerId) -> PlannedStep {
  let layer = arena.get(id);
  PlannedStep {
    directive: layer.directive.clone(),
    identity: layer.identity.clone(),
    cached: layer.exists(),
  }
}
