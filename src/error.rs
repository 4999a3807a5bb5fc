//! Error types for sigslice

use thiserror::Error;

/// Main error type for sigslice operations
#[derive(Debug, Error)]
pub enum SliceError {
    #[error("Parse error: {message} ({count} diagnostics)")]
    Parse { message: String, count: usize },

    #[error("No module wrapper found in player script")]
    NoModuleWrapper,

    #[error("Assembled script references undeclared names: {}", .0.join(", "))]
    IncompleteAssembly(Vec<String>),

    #[error("Extraction target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Script execution failed: {0}")]
    Execution(String),

    #[error("Script returned a non-string value for {0}")]
    NonStringResult(String),

    #[error("Invalid format locator: {0}")]
    InvalidLocator(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Player fetch error: {0}")]
    PlayerFetch(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl SliceError {
    /// Check if error comes from the player script changing shape
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SliceError::NoModuleWrapper
                | SliceError::TargetUnavailable(_)
                | SliceError::IncompleteAssembly(_)
        )
    }

    /// Check if error was raised while running the assembled script
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            SliceError::Execution(_) | SliceError::NonStringResult(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SliceError::TargetUnavailable("sigFunction".into()).is_structural());
        assert!(SliceError::Execution("boom".into()).is_execution_failure());
        assert!(!SliceError::Generic("x".into()).is_structural());
    }

    #[test]
    fn test_incomplete_assembly_message() {
        let err = SliceError::IncompleteAssembly(vec!["a".into(), "b.c".into()]);
        assert_eq!(
            err.to_string(),
            "Assembled script references undeclared names: a, b.c"
        );
    }
}
