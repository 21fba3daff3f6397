//! Document Validator Contract
//!
//! Every validator variant (XHTML, RSS, plain XML, XSD schema) accepts the raw
//! bytes of a response body and produces an ordered list of [`ValidationError`]s.
//! Warnings are informational; errors fail the test case that requested the
//! validation.

use std::fmt;

/// Severity of a single validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Warning,
    Error,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Warning => f.write_str("WARNING"),
            ErrorType::Error => f.write_str("ERROR"),
        }
    }
}

/// Line and column of a finding, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A single finding reported by a [`DocumentValidator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub error_type: ErrorType,
    pub position: Option<Position>,
    pub message: String,
}

impl ValidationError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            position: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Warning, message)
    }

    /// Build a finding from raw coordinates where a negative line means "unknown".
    pub fn from_raw(error_type: ErrorType, line: i32, column: i32, message: impl Into<String>) -> Self {
        let finding = Self::new(error_type, message);
        if line < 0 {
            finding
        } else {
            finding.at(line as u32, column.max(0) as u32)
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.position = Some(Position { line, column });
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_type == ErrorType::Error
    }

    pub fn is_warning(&self) -> bool {
        self.error_type == ErrorType::Warning
    }

    /// Line number, or -1 when the position is unknown
    pub fn line(&self) -> i64 {
        self.position.map_or(-1, |p| i64::from(p.line))
    }

    /// Column number, or -1 when the position is unknown
    pub fn column(&self) -> i64 {
        self.position.map_or(-1, |p| i64::from(p.column))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// A validator for one kind of document.
///
/// Implementations must be stateless between calls so a single instance can be
/// shared by every test case of a suite.
pub trait DocumentValidator: Send + Sync {
    /// Human readable name used in test case names, e.g. `XHTML` or `RSS`
    fn name(&self) -> &str;

    /// Validate a complete document, returning findings in document order
    fn validate(&self, document: &[u8]) -> Vec<ValidationError>;
}

/// Convert a byte offset into a 1-based line/column position
pub(crate) fn position_at(document: &[u8], offset: usize) -> Position {
    let offset = offset.min(document.len());
    let before = &document[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() as u32 + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);
    let column = (offset - line_start) as u32 + 1;
    Position { line, column }
}
