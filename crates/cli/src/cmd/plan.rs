//! Implementation of the `strata plan` command.
//!
//! Computes the identity of every layer the script would produce without
//! running any tool, and reports which ones are already in the store.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use strata_lib::build::plan;
use strata_lib::script::parse;
use strata_lib::store::LayerStore;

use crate::output::{OutputFormat, print_info, print_json, print_step, print_warning};

pub fn cmd_plan(file: &Path, store: &Path, output: OutputFormat) -> Result<()> {
  let text = fs::read_to_string(file).with_context(|| format!("Failed to read script: {}", file.display()))?;
  let script = parse(&text);

  let store = LayerStore::open_read_only(store).context("Failed to open layer store")?;
  let steps = plan(&script.operations, &store).with_context(|| format!("Invalid script: {}", file.display()))?;

  if output.is_json() {
    return print_json(&steps);
  }

  for warning in &script.warnings {
    print_warning(&warning.to_string());
  }
  for step in &steps {
    print_step(step.cached, step.identity.as_str(), &step.directive);
  }

  let cached = steps.iter().filter(|s| s.cached).count();
  println!();
  print_info(&format!("{} cached, {} to build", cached, steps.len() - cached));
  Ok(())
}
