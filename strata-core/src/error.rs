//! Error types for the Strata engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by an external capability
/// (organization, parameter store, blob store, ...)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The requested resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to perform the call
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The remote API rejected the call because of rate limits
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// Any other remote failure
    #[error("Remote call failed: {0}")]
    Remote(String),
}

impl CapabilityError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur while resolving targets and parameters
#[derive(Debug, Error)]
pub enum EngineError {
    /// The deployment map document is absent or malformed
    #[error("Failed to load deployment map: {0}")]
    Load(String),

    /// A pipeline entry is structurally invalid
    #[error("Invalid deployment map entry for pipeline '{pipeline}': {message}")]
    Validation { pipeline: String, message: String },

    /// A target expression matches no known shape
    #[error("Unknown definition for target: {0}")]
    InvalidTarget(String),

    /// An expansion yielded zero active accounts
    #[error("No accounts found in {0}")]
    NoAccountsFound(String),

    /// An OU path segment has no matching child OU
    #[error(
        "Path {path} failed to return a child OU at '{segment}' (children found: [{}])",
        .siblings.join(", ")
    )]
    OuPathNotFound {
        path: String,
        segment: String,
        siblings: Vec<String>,
    },

    /// Walking parent links did not reach the root within the allowed depth
    #[error("Organization hierarchy above {id} exceeds the maximum depth of {max}")]
    HierarchyTooDeep { id: String, max: usize },

    /// A target group needs more actions per account than its wave allows
    #[error(
        "Wave size: {wave_size} set for '{target}', however: {required} actions necessary per target"
    )]
    InsufficientWaveSize {
        target: String,
        wave_size: usize,
        required: usize,
    },

    /// A required parameter or stack output does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// An intrinsic expression could not be parsed
    #[error("{expression} is not a valid {kind} string. Syntax should be: {expected}")]
    InvalidIntrinsicSyntax {
        expression: String,
        kind: &'static str,
        expected: &'static str,
    },

    /// An upload expression names no supported path style
    #[error(
        "Unknown upload style for {expression}, supported styles are: {}",
        .supported.join(", ")
    )]
    UnsupportedUploadStyle {
        expression: String,
        supported: Vec<String>,
    },

    /// A parameter override file exists but cannot be parsed
    #[error("Failed to parse parameter file {path}: {message}")]
    ParameterFile { path: String, message: String },

    /// The pipeline executor reported a terminal failure
    #[error("Pipeline {pipeline} failed: {reason}")]
    DeploymentFailed { pipeline: String, reason: String },

    /// A capability call failed
    #[error("Remote API error: {0}")]
    Remote(#[from] CapabilityError),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task aborted without returning a result
    #[error("Worker for '{0}' panicked")]
    WorkerPanicked(String),

    /// A setting the run depends on is missing from the environment
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Create a validation error for a pipeline
    pub fn validation(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the looked-up value does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(EngineError::NotFound("/a".to_string()).is_not_found());
        assert!(EngineError::from(CapabilityError::NotFound("x".to_string())).is_not_found());
        assert!(!EngineError::from(CapabilityError::Remote("x".to_string())).is_not_found());
        assert!(!EngineError::InvalidTarget("x".to_string()).is_not_found());
    }

    #[test]
    fn test_ou_path_message_lists_siblings() {
        let err = EngineError::OuPathNotFound {
            path: "/banking/qa".to_string(),
            segment: "qa".to_string(),
            siblings: vec!["prod".to_string(), "dev".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'qa'"));
        assert!(message.contains("prod, dev"));
    }
}
