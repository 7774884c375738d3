//! Typed script directives.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{Backend, GuestCommand, ToolError};
use crate::consts::DISK_FORMAT;
use crate::layer::Layer;
use crate::store::StoreError;

/// Path of the autostart entry written by `FINALIZE`.
pub const AUTOSTART_PATH: &str = "/etc/rc.d/rc.local";

const SERIAL_AUTOLOGIN: &str = r"mkdir -p /etc/systemd/system/serial-getty@ttyS0.service.d && printf '[Service]\nExecStart=\nExecStart=-/sbin/agetty --autologin root --keep-baud 115200,38400,9600 %%I $TERM\n' > /etc/systemd/system/serial-getty@ttyS0.service.d/autologin.conf";

const QUIET_BOOT: &str = r"if [ -f /etc/default/grub ]; then sed -i -e 's/^GRUB_TIMEOUT=.*/GRUB_TIMEOUT=0/' -e 's/ rhgb//' /etc/default/grub; fi; if command -v grubby >/dev/null 2>&1; then grubby --update-kernel=ALL --remove-args=rhgb --args='console=ttyS0 quiet'; fi";

const PERMISSIVE_SELINUX: &str =
  r"if [ -f /etc/selinux/config ]; then sed -i 's/^SELINUX=.*/SELINUX=permissive/' /etc/selinux/config; fi";

/// The closed registry of script keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Directive {
  Base,
  Mutate,
  Finalize,
  Maintainer,
  Label,
  Description,
}

impl Directive {
  pub const ALL: [Directive; 6] = [
    Directive::Base,
    Directive::Mutate,
    Directive::Finalize,
    Directive::Maintainer,
    Directive::Label,
    Directive::Description,
  ];

  /// Look up a keyword. Keywords are case-sensitive.
  pub fn from_keyword(keyword: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|d| d.keyword() == keyword)
  }

  pub fn keyword(self) -> &'static str {
    match self {
      Directive::Base => "BASE",
      Directive::Mutate => "MUTATE",
      Directive::Finalize => "FINALIZE",
      Directive::Maintainer => "MAINTAINER",
      Directive::Label => "LABEL",
      Directive::Description => "DESCRIPTION",
    }
  }

  /// Metadata directives are chain nodes without any disk effect.
  pub fn is_metadata(self) -> bool {
    matches!(self, Directive::Maintainer | Directive::Label | Directive::Description)
  }
}

impl fmt::Display for Directive {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.keyword())
  }
}

/// One parsed directive.
///
/// Arguments are kept exactly as written in the script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
  Base { reference: String },
  Mutate { command: String },
  Finalize { command: String },
  Metadata { directive: Directive, text: String },
}

impl Operation {
  pub fn new(directive: Directive, argument: impl Into<String>) -> Self {
    let argument = argument.into();
    match directive {
      Directive::Base => Operation::Base { reference: argument },
      Directive::Mutate => Operation::Mutate { command: argument },
      Directive::Finalize => Operation::Finalize { command: argument },
      metadata => Operation::Metadata {
        directive: metadata,
        text: argument,
      },
    }
  }

  pub fn directive(&self) -> Directive {
    match self {
      Operation::Base { .. } => Directive::Base,
      Operation::Mutate { .. } => Directive::Mutate,
      Operation::Finalize { .. } => Directive::Finalize,
      Operation::Metadata { directive, .. } => *directive,
    }
  }

  pub fn argument(&self) -> &str {
    match self {
      Operation::Base { reference } => reference,
      Operation::Mutate { command } | Operation::Finalize { command } => command,
      Operation::Metadata { text, .. } => text,
    }
  }

  /// Stable textual form hashed into derived identities: `KIND:argument`.
  pub fn descriptor(&self) -> String {
    format!("{}:{}", self.directive(), self.argument())
  }

  pub fn is_base(&self) -> bool {
    matches!(self, Operation::Base { .. })
  }

  /// Bring `target` into the state this operation describes.
  ///
  /// For `BASE` the target is created from scratch; the caller decides
  /// whether an existing disk is reused. Every other kind expects the target
  /// to already hold its parent's state.
  pub async fn apply<B: Backend>(&self, target: &Layer, backend: &B) -> Result<(), ApplyError> {
    match self {
      Operation::Base { reference } => {
        info!(identity = %target.identity, "materializing base image");
        backend
          .materialize(reference.trim(), DISK_FORMAT, &target.location)
          .await
          .map_err(|e| ApplyError::Storage(StoreError::Backend(e)))?;
      }
      Operation::Mutate { command } => {
        debug!(identity = %target.identity, "running guest command");
        backend
          .execute(&target.location, &GuestCommand::Shell(command.clone()))
          .await?;
      }
      Operation::Finalize { command } => {
        for step in finalize_commands(command) {
          backend.execute(&target.location, &step).await?;
        }
      }
      Operation::Metadata { directive, text } => {
        info!(directive = %directive, text = %text, "metadata directive recorded");
      }
    }
    Ok(())
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.directive(), self.argument())
  }
}

#[derive(Debug, Error)]
pub enum ApplyError {
  #[error(transparent)]
  Storage(StoreError),

  #[error(transparent)]
  Executor(#[from] ToolError),
}

/// The guest steps a `FINALIZE` directive expands to.
pub fn finalize_commands(startup: &str) -> Vec<GuestCommand> {
  vec![
    GuestCommand::WriteFile {
      path: AUTOSTART_PATH.to_string(),
      content: format!("#!/bin/sh\n{}\n", startup),
    },
    GuestCommand::Shell(format!("chmod +x {}", AUTOSTART_PATH)),
    GuestCommand::Shell(SERIAL_AUTOLOGIN.to_string()),
    GuestCommand::Shell(QUIET_BOOT.to_string()),
    GuestCommand::Shell(PERMISSIVE_SELINUX.to_string()),
  ]
}
