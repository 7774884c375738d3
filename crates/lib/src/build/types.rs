//! Configuration, results and errors of a build.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::backend::ToolError;
use crate::layer::{Identity, Layer};
use crate::platform::paths::store_dir;
use crate::script::{ParseMode, ParseWarning, ScriptError};
use crate::store::StoreError;

/// How long a build waits for another process holding the same identity.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10 * 60);

/// Knobs of a single build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Root of the layer store.
  pub store_root: PathBuf,

  /// Re-materialize and re-apply every derived layer, even when cached.
  /// Base images are still reused.
  pub force_rebuild: bool,

  /// Treat parse warnings as fatal.
  pub strict: bool,

  /// Upper bound on waiting for a per-identity lock.
  pub lock_wait: Duration,

  /// Recorded in lock files so a waiting build can name the holder.
  pub command: String,
}

impl BuildConfig {
  pub fn new(store_root: impl Into<PathBuf>) -> Self {
    Self {
      store_root: store_root.into(),
      force_rebuild: false,
      strict: false,
      lock_wait: DEFAULT_LOCK_WAIT,
      command: crate::consts::APP_NAME.to_string(),
    }
  }

  pub fn parse_mode(&self) -> ParseMode {
    if self.strict { ParseMode::Strict } else { ParseMode::Lenient }
  }
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self::new(store_dir())
  }
}

/// Whether a step reused an existing disk or produced a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Cached,
  Built,
}

/// One folded directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
  /// `KIND:argument` of the directive.
  pub directive: String,
  pub identity: Identity,
  pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
  pub cached: usize,
  pub built: usize,
}

impl BuildStats {
  pub fn total(&self) -> usize {
    self.cached + self.built
  }
}

/// Result of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
  /// The last layer of the chain.
  pub terminal: Layer,
  pub steps: Vec<StepReport>,
  pub tag: Option<String>,
  pub stats: BuildStats,
  pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Script(#[from] ScriptError),

  #[error("failed to open layer store: {0}")]
  OpenStore(#[source] StoreError),

  #[error("{directive} ({identity}): {source}")]
  Storage {
    directive: String,
    identity: Identity,
    source: StoreError,
  },

  #[error("{directive} ({identity}): guest command failed: {source}")]
  Executor {
    directive: String,
    identity: Identity,
    source: ToolError,
  },
}

impl BuildError {
  pub(crate) fn storage(layer: &Layer, source: StoreError) -> Self {
    BuildError::Storage {
      directive: layer.directive.clone(),
      identity: layer.identity.clone(),
      source,
    }
  }

  pub(crate) fn executor(layer: &Layer, source: ToolError) -> Self {
    BuildError::Executor {
      directive: layer.directive.clone(),
      identity: layer.identity.clone(),
      source,
    }
  }

  /// The identity the failing step was building, if any.
  pub fn identity(&self) -> Option<&Identity> {
    match self {
      BuildError::Storage { identity, .. } | BuildError::Executor { identity, .. } => Some(identity),
      BuildError::Script(_) | BuildError::OpenStore(_) => None,
    }
  }
}
