//! Error types shared by the generik8s crates
//!
//! Errors carry enough context (the resource or operation involved) to be
//! useful in a log line without a backtrace.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for generik8s operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid user input
    #[error("validation error for {field}: {message}")]
    Validation {
        /// Option or field that failed validation
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "state-store", "watcher")
        context: String,
    },
}

impl Error {
    /// Create a validation error for the given field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need an input fix. Kubernetes
    /// 4xx responses are rejections, everything else is transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: how failures surface to the operator
    // ==========================================================================

    /// Story: bad user input names the option that needs fixing
    #[test]
    fn story_validation_names_the_offending_option() {
        let err = Error::validation("ports", "token 'web' is missing a port");
        assert!(err.to_string().contains("validation error for ports"));
        assert!(err.to_string().contains("missing a port"));
        assert_eq!(err.context(), Some("ports"));
        assert!(!err.is_retryable());
    }

    /// Story: a broken state blob is not retried blindly
    #[test]
    fn story_serialization_errors_are_permanent() {
        let err = Error::serialization_for_kind("ConfigMap", "expected value at line 1");
        assert!(err.to_string().contains("serialization error"));
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("ConfigMap")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_errors_carry_context() {
        let err = Error::internal_with_context("state-store", "configmap vanished");
        assert_eq!(err.context(), Some("state-store"));
        assert!(err.to_string().contains("[state-store]"));
        assert!(err.is_retryable());

        let err = Error::internal("boom");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn json_errors_convert_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization { kind: None, .. }));
    }
}
