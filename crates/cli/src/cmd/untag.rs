use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use strata_lib::build::DEFAULT_LOCK_WAIT;
use strata_lib::store::LayerStore;

use crate::output::{OutputFormat, print_json, print_success};

pub fn cmd_untag(name: &str, store: &Path, output: OutputFormat) -> Result<()> {
  let store = LayerStore::open(store).context("Failed to open layer store")?;

  let rt = super::runtime()?;
  rt.block_on(store.remove_tag(name, "strata untag", DEFAULT_LOCK_WAIT))
    .with_context(|| format!("Failed to remove tag {}", name))?;

  if output.is_json() {
    print_json(&json!({ "removed": name }))
  } else {
    print_success(&format!("Removed tag {}", name));
    Ok(())
  }
}
