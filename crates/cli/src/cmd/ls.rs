use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use strata_lib::layer::LayerKind;
use strata_lib::store::LayerStore;

use crate::output::{OutputFormat, format_bytes, print_info, print_json};

pub fn cmd_ls(store: &Path, output: OutputFormat) -> Result<()> {
  let store = LayerStore::open_read_only(store).context("Failed to open layer store")?;
  let disks = store.list().context("Failed to list store")?;

  if output.is_json() {
    return print_json(&disks);
  }

  if disks.is_empty() {
    print_info("Store is empty");
    return Ok(());
  }

  for disk in &disks {
    let kind = match disk.kind {
      LayerKind::Tag => "tag",
      LayerKind::Base | LayerKind::Derived => "layer",
    };
    let state = if disk.complete { "" } else { " (incomplete)" };
    println!(
      "{:<6} {:<24} {:>10}{}",
      kind.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      disk.name,
      format_bytes(disk.size_bytes),
      state.if_supports_color(Stream::Stdout, |s| s.yellow())
    );
  }
  Ok(())
}
