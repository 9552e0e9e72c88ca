//! Workload compilation error types
//!
//! Every variant here is a user input problem. The controller reports them
//! as a blocked status and waits for the input to change; none is retried.

use thiserror::Error;

/// Errors raised while resolving config or building the workload spec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    /// A structured config option did not decode to a key/value mapping
    #[error("{field} {reason}")]
    MalformedConfig {
        /// Option that failed to decode (`container_config` or `container_secrets`)
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A `ports` token could not be parsed as `name:port`
    #[error("invalid port spec '{token}': {reason}")]
    InvalidPortSpec {
        /// The offending token
        token: String,
        /// What was wrong with it
        reason: String,
    },
}

impl WorkloadError {
    /// Create a malformed-config error for an option
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Create an invalid-port-spec error for a token
    pub fn invalid_port(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPortSpec {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

impl From<WorkloadError> for generik8s_common::Error {
    fn from(err: WorkloadError) -> Self {
        let field = match &err {
            WorkloadError::MalformedConfig { field, .. } => field.to_string(),
            WorkloadError::InvalidPortSpec { .. } => "ports".to_string(),
        };
        generik8s_common::Error::validation(field, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_config_reads_as_a_status_message() {
        let err = WorkloadError::malformed("container_config", "is not a YAML mapping");
        assert_eq!(err.to_string(), "container_config is not a YAML mapping");
    }

    #[test]
    fn invalid_port_names_the_token() {
        let err = WorkloadError::invalid_port("web", "expected name:port");
        assert_eq!(err.to_string(), "invalid port spec 'web': expected name:port");
    }

    #[test]
    fn converts_to_common_validation_error() {
        let err: generik8s_common::Error = WorkloadError::invalid_port("web:x", "bad").into();
        assert_eq!(err.context(), Some("ports"));

        let err: generik8s_common::Error =
            WorkloadError::malformed("container_secrets", "is not a YAML mapping").into();
        assert_eq!(err.context(), Some("container_secrets"));
    }
}
