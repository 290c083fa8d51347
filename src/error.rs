//! Shared error utilities used across the compilation pipeline.
//!
//! There is a single error policy: the first unexpected condition is fatal.
//! Components construct a `CompileError` through `CompileError::at` and
//! propagate it with `?`; the driver prints the diagnostic and exits. The
//! message points at the offending column with a caret.

use snafu::Snafu;

use crate::tokenizer::Location;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{line}:{col}: {message}\n{source_line}\n{marker}"))]
  WithLocation {
    line: usize,
    col: usize,
    message: String,
    source_line: String,
    marker: String,
  },
}

impl CompileError {
  /// Construct an error anchored at a source location.
  pub fn at(source: &str, loc: Location, message: impl Into<String>) -> Self {
    let source_line = source
      .lines()
      .nth(loc.line.saturating_sub(1))
      .unwrap_or("")
      .to_string();
    let marker = format!("{}^", " ".repeat(loc.col.saturating_sub(1)));
    Self::WithLocation {
      line: loc.line,
      col: loc.col,
      message: message.into(),
      source_line,
      marker,
    }
  }
}
