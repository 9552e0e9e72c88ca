//! Common types for generik8s: errors, Kubernetes helpers, and logging setup

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Field manager used for every server-side apply issued by the controller
pub const FIELD_MANAGER: &str = "generik8s";

/// Standard Kubernetes label for the application name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on resources owned by generik8s
pub const LABEL_MANAGED_BY_GENERIK8S: &str = "generik8s";

/// Pod template annotation carrying the hash of the container config.
///
/// Changing config changes the hash, which rolls the pods.
pub const CONFIG_HASH_ANNOTATION: &str = "generik8s.dev/config-hash";
