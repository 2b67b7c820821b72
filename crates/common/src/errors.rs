use thiserror::Error;

/// Common error types for the application.
#[derive(Error, Debug, PartialEq)]
pub enum CommonError {
    /// Represents an error during data parsing or deserialization.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// An order-book snapshot violates its ordering or positivity invariants.
    #[error("Invalid order book: {0}")]
    InvalidBook(String),
}

/// Broad classification used when reporting failures to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An update older than what is already held.
    StaleData,
    /// A precondition check failed before any order was placed.
    ValidationFailure,
    /// Retrying the same call may succeed.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// Some but not all steps of a plan filled; funds are split across venues.
    PartialExecution,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::StaleData => "stale_data",
            ErrorKind::ValidationFailure => "validation_failure",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::PartialExecution => "partial_execution",
        };
        f.write_str(name)
    }
}

/// Errors returned by exchange adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("transient exchange error: {0}")]
    Transient(String),

    #[error("permanent exchange error: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Transient(_) => ErrorKind::Transient,
            AdapterError::Permanent(_) => ErrorKind::Permanent,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = CommonError::ParseError("Invalid pair".to_string());
        assert_eq!(format!("{}", err), "Parse error: Invalid pair");
    }

    #[test]
    fn test_invalid_book_display() {
        let err = CommonError::InvalidBook("crossed".to_string());
        assert_eq!(format!("{}", err), "Invalid order book: crossed");
    }

    #[test]
    fn test_adapter_error_classification() {
        let transient = AdapterError::Transient("timeout".into());
        let permanent = AdapterError::Permanent("insufficient funds".into());
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert_eq!(transient.kind(), ErrorKind::Transient);
        assert_eq!(permanent.kind(), ErrorKind::Permanent);
        assert_eq!(
            format!("{}", permanent),
            "permanent exchange error: insufficient funds"
        );
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::PartialExecution.to_string(), "partial_execution");
        assert_eq!(ErrorKind::StaleData.to_string(), "stale_data");
    }
}
