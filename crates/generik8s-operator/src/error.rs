//! Convergence errors
//!
//! Input problems never show up here: they become a blocked status inside
//! the cycle that saw them. A `ReconcileError` means a collaborator failed,
//! the cycle's state was not persisted, and the event must be redelivered.

use thiserror::Error;

/// Fatal failure of a convergence cycle
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Pushing the workload spec to the cluster failed
    #[error("failed to apply workload spec: {source}")]
    Apply {
        /// Underlying failure
        #[source]
        source: generik8s_common::Error,
    },

    /// Loading or saving the convergence state failed
    #[error("failed to persist convergence state: {source}")]
    Store {
        /// Underlying failure
        #[source]
        source: generik8s_common::Error,
    },

    /// Publishing the database request failed
    #[error("failed to publish database request: {source}")]
    DatabaseRequest {
        /// Underlying failure
        #[source]
        source: generik8s_common::Error,
    },

    /// Reporting the unit status failed
    #[error("failed to report status: {source}")]
    Status {
        /// Underlying failure
        #[source]
        source: generik8s_common::Error,
    },
}

impl ReconcileError {
    /// Short name of the failing collaborator, for log fields
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Apply { .. } => "apply",
            ReconcileError::Store { .. } => "store",
            ReconcileError::DatabaseRequest { .. } => "database_request",
            ReconcileError::Status { .. } => "status",
        }
    }

    /// The underlying error
    pub fn inner(&self) -> &generik8s_common::Error {
        match self {
            ReconcileError::Apply { source }
            | ReconcileError::Store { source }
            | ReconcileError::DatabaseRequest { source }
            | ReconcileError::Status { source } => source,
        }
    }
}
