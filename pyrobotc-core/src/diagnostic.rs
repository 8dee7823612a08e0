//! Diagnostics collected while translating a unit.
//!
//! Recoverable failures never abort a run. They are turned into a
//! `Diagnostic`, logged, and handed back to the caller together with the
//! rendered text so that partial output can be told apart from a complete
//! translation.

use std::fmt;
use std::path::PathBuf;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    /// File the diagnostic belongs to, when known.
    pub path: Option<PathBuf>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            span,
            path: None,
        }
    }

    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            span,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.path {
            Some(path) => write!(f, "{level}: {}:{}: {}", path.display(), self.span, self.message),
            None => write!(f, "{level}: {}: {}", self.span, self.message),
        }
    }
}
