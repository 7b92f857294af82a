//! Calculator error types and diagnostics.
//!
//! The calculator distinguishes five error kinds, shown on the display as
//! `Syntax ERROR`, `Math ERROR`, and so on. This module maps Rust error
//! handling to that taxonomy while carrying a source position and an
//! optional detail message for diagnostics.

use std::fmt;

/// The calculator's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token sequence. Recovered per statement by the parser.
    Syntax,
    /// A value fails a function's or operator's domain precondition.
    Argument,
    /// Operation undefined for the given operands (divide by zero,
    /// factorial of 70 or more, logarithm of a non-positive number, ...).
    Math,
    /// Unknown variable, or an undefined label used by `Goto`.
    Reference,
    /// Magnitude or base-width violation enforced by the calculation mode.
    Range,
}

impl ErrorKind {
    /// The label shown on the calculator display.
    pub fn label(self) -> &'static str {
        match self {
            Self::Syntax => "Syntax ERROR",
            Self::Argument => "Argument ERROR",
            Self::Math => "Math ERROR",
            Self::Reference => "Reference ERROR",
            Self::Range => "Range ERROR",
        }
    }
}

/// A calculator error with optional source position and detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub position: Option<usize>,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            position: None,
            detail: None,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Whether the parser recovers from this error by emitting an error
    /// node and resuming at the next statement separator.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Syntax | ErrorKind::Argument)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.label())?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {detail}")?;
        }
        if let Some(position) = self.position {
            write!(f, " (at position {position})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Convenience alias.
pub type CalcResult<T> = Result<T, Diagnostic>;

/// Shorthand constructors used throughout the crate.
pub fn syntax_error(detail: impl Into<String>) -> Diagnostic {
    Diagnostic::new(ErrorKind::Syntax).with_detail(detail)
}

pub fn argument_error(detail: impl Into<String>) -> Diagnostic {
    Diagnostic::new(ErrorKind::Argument).with_detail(detail)
}

pub fn math_error() -> Diagnostic {
    Diagnostic::new(ErrorKind::Math)
}

pub fn reference_error(detail: impl Into<String>) -> Diagnostic {
    Diagnostic::new(ErrorKind::Reference).with_detail(detail)
}
