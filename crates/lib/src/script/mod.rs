//! Build scripts.
//!
//! A script is a sequence of line-oriented directives:
//!
//! ```text
//! # comment
//! BASE fedora-23
//! MAINTAINER ops@example.com
//! MUTATE dnf -y install \
//!     nginx
//! FINALIZE nginx -g 'daemon off;'
//! ```
//!
//! - [`parse`] - turns text into [`Operation`]s plus non-fatal [`ParseWarning`]s
//! - [`op`] - the operation sum type and its `apply` dispatch

pub mod op;
pub mod parse;

pub use op::{ApplyError, Directive, Operation};
pub use parse::{ParseMode, ParseWarning, Script, WarningKind, parse, parse_with};

use thiserror::Error;

/// A malformed or semantically invalid directive sequence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
  #[error("script contains no directives")]
  Empty,

  #[error("first directive must be BASE, found `{0}`")]
  MissingBase(String),

  #[error("BASE may only appear once, found `{0}` after the chain started")]
  RepeatedBase(String),

  #[error("BASE reference `{0}` is empty")]
  EmptyBaseReference(String),

  #[error("invalid tag name `{0}`: use letters, digits, `.`, `_` or `-` and do not start with `.`")]
  InvalidTag(String),

  #[error("nothing to tag: no layers were built")]
  NothingToTag,

  #[error("{0}")]
  Strict(ParseWarning),
}
