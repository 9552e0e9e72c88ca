//! Convergence state persistence and status reporting
//!
//! The state holds the database password and the secrets document, so it
//! is kept in a Secret. The surfaced status goes to a ConfigMap where
//! operators can read it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use generik8s_common::kube_utils::{apply_namespaced, get_optional};
use generik8s_common::{
    Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_GENERIK8S, LABEL_NAME,
};

use crate::flags::ConvergenceState;
use crate::status::UnitStatus;

/// Key of the serialized state in the state Secret
pub const STATE_KEY: &str = "state";
/// Key of the status state name in the status ConfigMap
pub const STATUS_KEY: &str = "status";
/// Key of the status message in the status ConfigMap
pub const MESSAGE_KEY: &str = "message";

/// Loads and saves the convergence state
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved state, `None` on first run
    async fn load(&self) -> Result<Option<ConvergenceState>, Error>;

    /// Save the state
    async fn save(&self, state: &ConvergenceState) -> Result<(), Error>;
}

/// Surfaces the unit status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    /// Report a status
    async fn report(&self, status: &UnitStatus) -> Result<(), Error>;
}

fn metadata(name: &str, namespace: &str, app: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([
            (LABEL_NAME.to_string(), app.to_string()),
            (
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_GENERIK8S.to_string(),
            ),
        ])),
        ..Default::default()
    }
}

/// Decode a saved state document.
///
/// An unreadable document loads as no state: every flag starts clear, which
/// at worst re-runs handlers that already ran.
pub fn decode_state(raw: &[u8]) -> Option<ConvergenceState> {
    match serde_json::from_slice(raw) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "saved convergence state is unreadable, starting over");
            None
        }
    }
}

/// Keeps the state in a Secret
pub struct KubeStateStore {
    client: Client,
    namespace: String,
    name: String,
    app: String,
}

impl KubeStateStore {
    /// Store in Secret `name` in `namespace` on behalf of `app`
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        app: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            app: app.into(),
        }
    }
}

#[async_trait]
impl StateStore for KubeStateStore {
    async fn load(&self) -> Result<Option<ConvergenceState>, Error> {
        let secret: Option<Secret> = get_optional(&self.client, &self.namespace, &self.name).await?;
        let raw = secret
            .and_then(|s| s.data)
            .and_then(|mut data| data.remove(STATE_KEY));
        Ok(raw.and_then(|bytes| decode_state(&bytes.0)))
    }

    async fn save(&self, state: &ConvergenceState) -> Result<(), Error> {
        let json = serde_json::to_string(state)
            .map_err(|e| Error::serialization_for_kind("ConvergenceState", e.to_string()))?;
        let secret = Secret {
            metadata: metadata(&self.name, &self.namespace, &self.app),
            string_data: Some(BTreeMap::from([(STATE_KEY.to_string(), json)])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        apply_namespaced(&self.client, &self.namespace, &self.name, &secret, FIELD_MANAGER).await?;
        debug!(secret = %self.name, flags = ?state.flags(), "convergence state saved");
        Ok(())
    }
}

/// ConfigMap data for a status
pub fn status_data(status: &UnitStatus) -> BTreeMap<String, String> {
    BTreeMap::from([
        (STATUS_KEY.to_string(), status.state().to_string()),
        (MESSAGE_KEY.to_string(), status.message().to_string()),
    ])
}

/// Writes the status to a ConfigMap
pub struct KubeStatusReporter {
    client: Client,
    namespace: String,
    name: String,
    app: String,
}

impl KubeStatusReporter {
    /// Report to ConfigMap `name` in `namespace` on behalf of `app`
    pub fn new(
        client: Client,
        namespace: impl Into<String>,
        name: impl Into<String>,
        app: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
            app: app.into(),
        }
    }
}

#[async_trait]
impl StatusReporter for KubeStatusReporter {
    async fn report(&self, status: &UnitStatus) -> Result<(), Error> {
        let cm = ConfigMap {
            metadata: metadata(&self.name, &self.namespace, &self.app),
            data: Some(status_data(status)),
            ..Default::default()
        };
        apply_namespaced(&self.client, &self.namespace, &self.name, &cm, FIELD_MANAGER).await?;
        Ok(())
    }
}
