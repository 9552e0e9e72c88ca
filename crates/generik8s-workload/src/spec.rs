//! Workload spec building
//!
//! The workload spec is the single declarative value the controller pushes
//! to the cluster. It is a plain value type: two specs are the same workload
//! exactly when they compare equal, and [`WorkloadSpec::digest`] is stable
//! enough to persist for that comparison.

use std::fmt;

use generik8s_common::kube_utils::deterministic_hash;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{resolve_full, resolve_sanitized, MergedConfig};
use crate::connection::ConnectionState;
use crate::error::WorkloadError;
use crate::interpolate::{interpolate, InterpolatedConfig};
use crate::options::ControllerOptions;

/// Protocol of every exposed port
pub const DEFAULT_PROTOCOL: &str = "TCP";

/// A named container port
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port name
    pub name: String,
    /// Port number inside the container
    pub container_port: u16,
    /// Transport protocol
    pub protocol: String,
}

/// Declarative description of the workload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Name of the single container (the application name)
    pub container_name: String,
    /// Container image
    pub image: String,
    /// Exposed ports, in declaration order
    pub ports: Vec<ContainerPort>,
    /// Interpolated container config
    pub config: InterpolatedConfig,
}

impl WorkloadSpec {
    /// Stable digest of the spec value.
    ///
    /// Equal specs have equal digests. Every field is length-prefixed so no
    /// two distinct specs share a canonical form.
    pub fn digest(&self) -> String {
        let mut data = String::new();
        push_field(&mut data, "name", &self.container_name);
        push_field(&mut data, "image", &self.image);
        for port in &self.ports {
            push_field(&mut data, "port", &port.name);
            push_field(&mut data, "number", &port.container_port.to_string());
            push_field(&mut data, "protocol", &port.protocol);
        }
        push_config(&mut data, &self.config);
        deterministic_hash(&data)
    }
}

/// Append one length-prefixed field to a canonical encoding
fn push_field(data: &mut String, tag: &str, value: &str) {
    data.push_str(tag);
    data.push_str(&value.len().to_string());
    data.push(':');
    data.push_str(value);
    data.push('\n');
}

/// Append config entries, in key order, to a canonical encoding
pub(crate) fn push_config(data: &mut String, config: &InterpolatedConfig) {
    for (k, v) in config {
        push_field(data, "key", k);
        push_field(data, "value", v);
    }
}

// Config values may hold secrets; Debug prints keys only.
impl fmt::Debug for WorkloadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadSpec")
            .field("container_name", &self.container_name)
            .field("image", &self.image)
            .field("ports", &self.ports)
            .field("config_keys", &self.config.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Output of [`SpecBuilder::build`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltSpec {
    /// The spec to apply, secrets included
    pub spec: WorkloadSpec,
    /// The same spec without secrets, safe to log or print
    pub sanitized: WorkloadSpec,
}

/// Parse `ports` into container ports.
///
/// Tokens are whitespace-separated `name:port` pairs split at the first `:`.
pub fn parse_ports(ports: &str) -> Result<Vec<ContainerPort>, WorkloadError> {
    ports
        .split_whitespace()
        .map(|token| {
            let (name, port) = token
                .split_once(':')
                .ok_or_else(|| WorkloadError::invalid_port(token, "expected name:port"))?;
            if name.is_empty() {
                return Err(WorkloadError::invalid_port(token, "port name is empty"));
            }
            let container_port = port
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    WorkloadError::invalid_port(token, "port must be an integer in 1..=65535")
                })?;
            Ok(ContainerPort {
                name: name.to_string(),
                container_port,
                protocol: DEFAULT_PROTOCOL.to_string(),
            })
        })
        .collect()
}

/// Builds the workload spec from options and the current connection state
#[derive(Clone, Debug)]
pub struct SpecBuilder {
    container_name: String,
}

impl SpecBuilder {
    /// Create a builder for the named application
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
        }
    }

    /// Build the spec.
    ///
    /// The sanitized spec is logged before secrets are resolved; a failure
    /// on either side returns the error and nothing is half-built.
    pub fn build(
        &self,
        options: &ControllerOptions,
        state: Option<&ConnectionState>,
    ) -> Result<BuiltSpec, WorkloadError> {
        let raw = resolve_sanitized(options)?;
        let ports = parse_ports(&options.ports)?;

        let sanitized = WorkloadSpec {
            container_name: self.container_name.clone(),
            image: options.image.trim().to_string(),
            ports,
            config: interpolate(&raw, state),
        };

        let logged = logged_view(&sanitized, &raw, state);
        match serde_yaml::to_string(&logged) {
            Ok(yaml) => info!(
                container = %logged.container_name,
                "container spec (sans secrets):\n{}",
                yaml
            ),
            Err(e) => warn!(error = %e, "failed to render container spec for logging"),
        }

        let mut spec = sanitized.clone();
        spec.config.extend(interpolate(&resolve_full(options)?, state));

        Ok(BuiltSpec { spec, sanitized })
    }
}

/// The sanitized spec as it may be logged.
///
/// Placeholders can pull database credentials into the config, so they are
/// interpolated against a redacted connection state.
fn logged_view(
    sanitized: &WorkloadSpec,
    raw: &MergedConfig,
    state: Option<&ConnectionState>,
) -> WorkloadSpec {
    WorkloadSpec {
        config: interpolate(raw, state.map(ConnectionState::redacted).as_ref()),
        ..sanitized.clone()
    }
}
