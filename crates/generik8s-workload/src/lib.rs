//! Workload compilation for generik8s
//!
//! Turns controller options and the current database connection into a
//! [`WorkloadSpec`], and renders that spec into Kubernetes resources:
//!
//! - [`config`] resolves `container_config` and `container_secrets` into a
//!   merged key/value mapping
//! - [`gate`] decides whether that mapping references the database at all
//! - [`connection`] tracks the database connection parameters
//! - [`interpolate`] substitutes `$PGHOST`-style placeholders
//! - [`spec`] builds the workload spec that the controller applies
//! - [`k8s`] renders the spec into a Deployment and its config Secret
//!
//! # Usage
//!
//! ```rust,ignore
//! let built = SpecBuilder::new(app_name).build(&options, tracker.current())?;
//! let resources = k8s::render(&built.spec, namespace);
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod gate;
pub mod interpolate;
pub mod k8s;
pub mod options;
pub mod spec;

pub use config::{resolve_full, resolve_sanitized, MergedConfig};
pub use connection::{ConnectionState, ConnectionTracker, MasterRecord, RelationEvent};
pub use error::WorkloadError;
pub use gate::{database_required, is_dependency_referenced};
pub use interpolate::{interpolate, InterpolatedConfig};
pub use options::{ControllerOptions, OptionKey};
pub use spec::{parse_ports, BuiltSpec, ContainerPort, SpecBuilder, WorkloadSpec};
