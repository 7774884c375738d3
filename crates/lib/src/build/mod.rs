//! Building layer chains.
//!
//! A build folds a script's operations, in order, into a chain of layers.
//! Each derived layer's identity depends only on its parent's identity and the
//! operation, so a layer that is already in the store is reused without
//! running anything.
//!
//! # Submodules
//!
//! - [`context`] - the folding state machine
//! - [`plan`] - dry run over the same identities

pub mod context;
pub mod plan;
mod types;

pub use context::BuildContext;
pub use plan::{PlannedStep, plan};
pub use types::*;

use tracing::info;

use crate::backend::Backend;
use crate::script::{Operation, ScriptError, parse_with};
use crate::store::LayerStore;

/// Build `ops` into the store named by `config`, optionally tagging the result.
pub async fn build<B: Backend>(
  ops: &[Operation],
  config: &BuildConfig,
  backend: &B,
  tag: Option<&str>,
) -> Result<BuildOutcome, BuildError> {
  if ops.is_empty() {
    return Err(ScriptError::Empty.into());
  }
  // Reject a bad tag before doing any work.
  if let Some(name) = tag
    && !crate::layer::is_valid_name(name)
  {
    return Err(ScriptError::InvalidTag(name.to_string()).into());
  }

  let store = LayerStore::open(&config.store_root).map_err(BuildError::OpenStore)?;
  let mut ctx = BuildContext::new(&store, backend, config);
  ctx.apply_all(ops).await?;
  if let Some(name) = tag {
    ctx.tag(name).await?;
  }
  let outcome = ctx.finish()?;

  info!(
    terminal = %outcome.terminal.identity,
    cached = outcome.stats.cached,
    built = outcome.stats.built,
    "build complete"
  );
  Ok(outcome)
}

/// Parse `text` and build it. Parse warnings are carried in the outcome.
pub async fn build_script<B: Backend>(
  text: &str,
  config: &BuildConfig,
  backend: &B,
  tag: Option<&str>,
) -> Result<BuildOutcome, BuildError> {
  let script = parse_with(text, config.parse_mode())?;
  let mut outcome = build(&script.operations, config, backend, tag).await?;
  outcome.warnings = script.warnings;
  Ok(outcome)
}
