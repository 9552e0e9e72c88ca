//! Pushing the workload spec to the cluster

use async_trait::async_trait;
use kube::Client;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use generik8s_common::kube_utils::apply_namespaced;
use generik8s_common::{Error, FIELD_MANAGER};
use generik8s_workload::k8s::{config_secret_name, render};
use generik8s_workload::WorkloadSpec;

/// Applies a workload spec to the cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadApplier: Send + Sync {
    /// Apply the spec, replacing whatever was applied before
    async fn apply_spec(&self, spec: &WorkloadSpec) -> Result<(), Error>;
}

/// Applies the spec as a config Secret plus a Deployment
pub struct KubeWorkloadApplier {
    client: Client,
    namespace: String,
}

impl KubeWorkloadApplier {
    /// Apply into `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl WorkloadApplier for KubeWorkloadApplier {
    async fn apply_spec(&self, spec: &WorkloadSpec) -> Result<(), Error> {
        let resources = render(spec, &self.namespace);
        let app = &spec.container_name;

        // Secret first so the new pods find their config
        apply_namespaced(
            &self.client,
            &self.namespace,
            &config_secret_name(app),
            &resources.config_secret,
            FIELD_MANAGER,
        )
        .await?;
        apply_namespaced(
            &self.client,
            &self.namespace,
            app,
            &resources.deployment,
            FIELD_MANAGER,
        )
        .await?;

        info!(
            app = %app,
            namespace = %self.namespace,
            image = %spec.image,
            "workload applied"
        );
        Ok(())
    }
}
