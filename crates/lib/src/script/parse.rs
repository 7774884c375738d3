//! Line-oriented directive parser.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::ScriptError;
use super::op::{Directive, Operation};

/// Why a line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
  /// The first token is not a registered keyword.
  UnknownDirective { keyword: String },
  /// The line has no space separating keyword and argument.
  MissingArgument { text: String },
}

/// A non-fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
  /// 1-based line where the logical line started.
  pub line: usize,
  #[serde(flatten)]
  pub kind: WarningKind,
}

impl fmt::Display for ParseWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      WarningKind::UnknownDirective { keyword } => {
        write!(f, "line {}: unknown directive `{}`", self.line, keyword)
      }
      WarningKind::MissingArgument { text } => {
        write!(f, "line {}: expected `KEYWORD argument`, got `{}`", self.line, text)
      }
    }
  }
}

/// How unknown or malformed lines are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
  /// Record a warning and skip the line.
  #[default]
  Lenient,
  /// Fail on the first problem.
  Strict,
}

/// Result of parsing a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
  pub operations: Vec<Operation>,
  pub warnings: Vec<ParseWarning>,
}

/// Parse script text, skipping unknown or malformed lines.
pub fn parse(text: &str) -> Script {
  let mut script = Script::default();
  for (line, content) in logical_lines(text) {
    match parse_line(line, &content) {
      Ok(Some(op)) => script.operations.push(op),
      Ok(None) => {}
      Err(warning) => {
        warn!(line = warning.line, "{}", warning);
        script.warnings.push(warning);
      }
    }
  }
  script
}

/// Parse script text with an explicit [`ParseMode`].
pub fn parse_with(text: &str, mode: ParseMode) -> Result<Script, ScriptError> {
  let script = parse(text);
  if mode == ParseMode::Strict
    && let Some(warning) = script.warnings.first()
  {
    return Err(ScriptError::Strict(warning.clone()));
  }
  Ok(script)
}

/// Joins continuation lines. Yields `(start_line, text)` for every logical line.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
  let mut lines = Vec::new();
  let mut pending: Option<(usize, String)> = None;

  for (idx, raw) in text.split('\n').enumerate() {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    let (start, mut buf) = pending.take().unwrap_or((idx + 1, String::new()));
    match raw.strip_suffix('\\') {
      Some(head) => {
        buf.push_str(head);
        pending = Some((start, buf));
      }
      None => {
        buf.push_str(raw);
        lines.push((start, buf));
      }
    }
  }

  // A trailing backslash on the last line has nothing to join with.
  if let Some(rest) = pending {
    lines.push(rest);
  }

  lines
}

fn parse_line(line: usize, content: &str) -> Result<Option<Operation>, ParseWarning> {
  let trimmed = content.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return Ok(None);
  }

  let Some((keyword, argument)) = trimmed.split_once(' ') else {
    return Err(ParseWarning {
      line,
      kind: WarningKind::MissingArgument {
        text: trimmed.to_string(),
      },
    });
  };

  let Some(directive) = Directive::from_keyword(keyword) else {
    return Err(ParseWarning {
      line,
      kind: WarningKind::UnknownDirective {
        keyword: keyword.to_string(),
      },
    });
  };

  Ok(Some(Operation::new(directive, argument)))
}
