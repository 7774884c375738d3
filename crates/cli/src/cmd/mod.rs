mod build;
mod ls;
mod plan;
mod untag;
mod vm;

pub use build::{BuildArgs, cmd_build};
pub use ls::cmd_ls;
pub use plan::cmd_plan;
pub use untag::cmd_untag;
pub use vm::{RunArgs, cmd_attach, cmd_destroy, cmd_run, parse_key_val};

use anyhow::{Context, Result};

/// Runtime for the async library calls. Commands are otherwise synchronous.
fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
