//! Implementation of the `strata build` command.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use strata_lib::backend::{Toolchain, ToolchainConfig};
use strata_lib::build::{BuildConfig, BuildOutcome, StepStatus, build_script};

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_step, print_success, print_warning};

pub struct BuildArgs {
  pub file: PathBuf,
  pub tag: Option<String>,
  pub force: bool,
  pub strict: bool,
  pub timeout: Option<Duration>,
  pub lock_wait: Option<Duration>,
}

#[derive(Serialize)]
struct BuildReport<'a> {
  #[serde(flatten)]
  outcome: &'a BuildOutcome,
  duration_ms: u128,
}

/// Build the script at `args.file` into the store at `store`.
///
/// Prints each step (cached or built) and a summary. On failure the error
/// names the directive and layer identity that failed.
pub fn cmd_build(args: BuildArgs, store: &Path, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let file = dunce::canonicalize(&args.file).unwrap_or_else(|_| args.file.clone());
  let text = fs::read_to_string(&file).with_context(|| format!("Failed to read script: {}", file.display()))?;

  let mut config = BuildConfig::new(store);
  config.force_rebuild = args.force;
  config.strict = args.strict;
  config.command = format!("strata build {}", file.display());
  if let Some(wait) = args.lock_wait {
    config.lock_wait = wait;
  }

  let mut tools = ToolchainConfig::from_env();
  if args.timeout.is_some() {
    tools.timeout = args.timeout;
  }
  debug!(?tools, store = %store.display(), "starting build");
  let toolchain = Toolchain::new(tools);

  let rt = super::runtime()?;
  let outcome = rt
    .block_on(build_script(&text, &config, &toolchain, args.tag.as_deref()))
    .with_context(|| format!("Build failed: {}", file.display()))?;

  if output.is_json() {
    return print_json(&BuildReport {
      outcome: &outcome,
      duration_ms: start.elapsed().as_millis(),
    });
  }

  for warning in &outcome.warnings {
    print_warning(&warning.to_string());
  }
  for step in &outcome.steps {
    print_step(step.status == StepStatus::Cached, step.identity.as_str(), &step.directive);
  }

  println!();
  print_success("Build complete!");
  print_stat("Layer", outcome.terminal.identity.as_str());
  print_stat("Disk", &outcome.terminal.location.display().to_string());
  if let Some(tag) = &outcome.tag {
    print_stat("Tag", tag);
  }
  print_stat("Steps", &outcome.stats.total().to_string());
  print_stat("Cached", &outcome.stats.cached.to_string());
  print_stat("Built", &outcome.stats.built.to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(())
}
