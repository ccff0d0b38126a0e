//! Error types shared by the sampling pipeline.

use std::io;
use std::path::PathBuf;

/// Reason a numeric token could not be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumError {
    /// The token had no digits at all.
    Empty,
    /// The token contained a byte that is not part of the number syntax.
    InvalidDigit,
    /// The value does not fit the target type.
    Overflow,
}

impl std::fmt::Display for NumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumError::Empty => write!(f, "empty value"),
            NumError::InvalidDigit => write!(f, "invalid digit"),
            NumError::Overflow => write!(f, "value out of range"),
        }
    }
}

impl std::error::Error for NumError {}

/// A recognized field whose value could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Name of the field (or column) being parsed.
    pub field: String,
    pub kind: NumError,
}

impl ParseError {
    pub fn new(field: impl Into<String>, kind: NumError) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}': {}", self.field, self.kind)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// The pseudo-file could not be opened.
    Open { path: PathBuf, source: io::Error },
    /// I/O error while rewinding or reading the pseudo-file.
    Io(io::Error),
    /// A field could not be converted and the policy forbids recovering.
    Parse(ParseError),
}

impl CollectError {
    /// Returns `true` for errors that abort a single sample only.
    ///
    /// Everything except a failed open is transient from the point of view
    /// of a periodic driver.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CollectError::Open { .. })
    }
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Open { path, source } => {
                write!(f, "cannot open {}: {}", path.display(), source)
            }
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Open { source, .. } => Some(source),
            CollectError::Io(e) => Some(e),
            CollectError::Parse(e) => Some(e),
        }
    }
}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field() {
        let err = CollectError::from(ParseError::new("rx_bytes", NumError::InvalidDigit));
        assert_eq!(
            err.to_string(),
            "parse error: field 'rx_bytes': invalid digit"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_open_error_is_not_transient() {
        let err = CollectError::Open {
            path: PathBuf::from("/proc/nope"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("cannot open /proc/nope"));
    }
}
