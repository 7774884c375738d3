mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_lib::consts::DEFAULT_SCRIPT;
use strata_lib::platform::paths::store_dir;
use strata_lib::vm::{DEFAULT_MEMORY_MIB, DEFAULT_VCPUS};

use crate::cmd::{BuildArgs, RunArgs};
use crate::output::{OutputFormat, print_error};

/// strata - layered VM disk images from build scripts
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Layer store root (default: $STRATA_STORE or the user cache directory)
  #[arg(long, global = true)]
  store: Option<PathBuf>,

  /// Output format
  #[arg(short = 'o', long, global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a script into a chain of cached disk layers
  Build {
    /// Path to the build script
    #[arg(default_value = DEFAULT_SCRIPT)]
    file: PathBuf,

    /// Snapshot the final layer under this name
    #[arg(short, long)]
    tag: Option<String>,

    /// Rebuild every derived layer even when cached
    #[arg(short, long)]
    force: bool,

    /// Fail on unknown directives instead of skipping them
    #[arg(long)]
    strict: bool,

    /// Limit for each external tool call (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// How long to wait for another build holding the same layer
    #[arg(long, value_parser = humantime::parse_duration)]
    lock_wait: Option<Duration>,
  },

  /// Show the layer identities a build would produce, and which are cached
  Plan {
    /// Path to the build script
    #[arg(default_value = DEFAULT_SCRIPT)]
    file: PathBuf,
  },

  /// List layers and tags in the store
  Ls,

  /// Remove a tag
  Untag {
    /// Tag to remove
    name: String,
  },

  /// Start a VM from a tag
  Run {
    /// Tag to boot
    tag: String,

    /// Name of the new machine
    #[arg(long)]
    name: String,

    /// Memory in MiB
    #[arg(long, default_value_t = DEFAULT_MEMORY_MIB)]
    memory: u32,

    /// Number of virtual CPUs
    #[arg(long, default_value_t = DEFAULT_VCPUS)]
    vcpus: u32,

    /// Metadata attached to the machine (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = cmd::parse_key_val)]
    metadata: Vec<(String, String)>,
  },

  /// Attach to a running machine's console
  Attach {
    /// Machine name
    name: String,
  },

  /// Stop and remove a machine and its instance disk
  Destroy {
    /// Machine name
    name: String,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let store = cli.store.unwrap_or_else(store_dir);
  let output = cli.output;

  match cli.command {
    Commands::Build {
      file,
      tag,
      force,
      strict,
      timeout,
      lock_wait,
    } => cmd::cmd_build(
      BuildArgs {
        file,
        tag,
        force,
        strict,
        timeout,
        lock_wait,
      },
      &store,
      output,
    ),
    Commands::Plan { file } => cmd::cmd_plan(&file, &store, output),
    Commands::Ls => cmd::cmd_ls(&store, output),
    Commands::Untag { name } => cmd::cmd_untag(&name, &store, output),
    Commands::Run {
      tag,
      name,
      memory,
      vcpus,
      metadata,
    } => cmd::cmd_run(
      RunArgs {
        tag,
        name,
        memory,
        vcpus,
        metadata,
      },
      &store,
      output,
    ),
    Commands::Attach { name } => cmd::cmd_attach(&name),
    Commands::Destroy { name } => cmd::cmd_destroy(&name, &store, output),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
