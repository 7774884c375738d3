//! `strata run`, `strata attach` and `strata destroy`.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use strata_lib::backend::{Toolchain, ToolchainConfig};
use strata_lib::store::LayerStore;
use strata_lib::vm::{self, MachineSpec};

use crate::output::{OutputFormat, print_json, print_stat, print_success};

pub struct RunArgs {
  pub tag: String,
  pub name: String,
  pub memory: u32,
  pub vcpus: u32,
  pub metadata: Vec<(String, String)>,
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
  match s.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
  }
}

pub fn cmd_run(args: RunArgs, store: &Path, output: OutputFormat) -> Result<()> {
  let store = LayerStore::open(store).context("Failed to open layer store")?;
  let toolchain = Toolchain::new(ToolchainConfig::from_env());

  let mut spec = MachineSpec::new(&args.name)
    .with_memory(args.memory)
    .with_vcpus(args.vcpus);
  for (key, value) in &args.metadata {
    spec = spec.with_metadata(key, value);
  }

  let rt = super::runtime()?;
  let disk = rt.block_on(vm::launch(&toolchain, &store, &args.tag, &spec))?;

  if output.is_json() {
    return print_json(&json!({ "machine": spec, "tag": args.tag, "disk": disk }));
  }

  print_success(&format!("Started {} from tag {}", spec.name, args.tag));
  print_stat("Disk", &disk.display().to_string());
  print_stat("Memory", &format!("{} MiB", spec.memory_mib));
  print_stat("vCPUs", &spec.vcpus.to_string());
  Ok(())
}

pub fn cmd_attach(name: &str) -> Result<()> {
  let toolchain = Toolchain::new(ToolchainConfig::from_env());
  let rt = super::runtime()?;
  rt.block_on(vm::attach(&toolchain, name))?;
  Ok(())
}

pub fn cmd_destroy(name: &str, store: &Path, output: OutputFormat) -> Result<()> {
  let store = LayerStore::open(store).context("Failed to open layer store")?;
  let toolchain = Toolchain::new(ToolchainConfig::from_env());

  let rt = super::runtime()?;
  rt.block_on(vm::destroy(&toolchain, &store, name))?;

  if output.is_json() {
    print_json(&json!({ "destroyed": name }))
  } else {
    print_success(&format!("Destroyed {}", name));
    Ok(())
  }
}
