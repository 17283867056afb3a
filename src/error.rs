use thiserror::Error;

/// Main error type for pubdex operations
#[derive(Error, Debug)]
pub enum PubdexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query syntax error: {0}")]
    Query(String),

    #[error("Unable to save '{0}': write lock contention")]
    ArchiveContention(String),

    #[error("Invalid identifier: {0}")]
    BadIdentifier(String),

    #[error("Corrupt postings data: {0}")]
    CorruptPostings(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for pubdex operations
pub type Result<T> = std::result::Result<T, PubdexError>;

impl PubdexError {
    /// Check if this error is fatal for a whole build, as opposed to a
    /// single record or term that can be skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, PubdexError::Io(_) | PubdexError::Query(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PubdexError::ArchiveContention("12345678".to_string());
        assert_eq!(
            err.to_string(),
            "Unable to save '12345678': write lock contention"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(PubdexError::Query("unbalanced parens".to_string()).is_fatal());
        assert!(!PubdexError::BadIdentifier("x".repeat(70)).is_fatal());
    }
}
