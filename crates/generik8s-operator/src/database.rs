//! Database request publishing
//!
//! The controller tells the PostgreSQL side what it wants: a database name,
//! a set of extensions and a set of roles. The request is published as a
//! ConfigMap the database side watches.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use tokio::sync::Mutex;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use generik8s_common::kube_utils::apply_namespaced;
use generik8s_common::{
    Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_GENERIK8S, LABEL_NAME,
};

/// Publishes the database request
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatabaseRequests: Send + Sync {
    /// Request a database by name (empty lets the database side choose)
    async fn set_database(&self, name: &str) -> Result<(), Error>;

    /// Request extensions
    async fn set_extensions(&self, extensions: &BTreeSet<String>) -> Result<(), Error>;

    /// Request roles
    async fn set_roles(&self, roles: &BTreeSet<String>) -> Result<(), Error>;
}

/// The full request as published
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseRequest {
    /// Database name
    pub database: String,
    /// Extensions
    pub extensions: BTreeSet<String>,
    /// Roles
    pub roles: BTreeSet<String>,
}

impl DatabaseRequest {
    /// ConfigMap data carrying the request; sets are comma-joined
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
        BTreeMap::from([
            ("database".to_string(), self.database.clone()),
            ("extensions".to_string(), join(&self.extensions)),
            ("roles".to_string(), join(&self.roles)),
        ])
    }
}

/// Publishes the request to a ConfigMap.
///
/// Each setter updates one part and re-applies the whole request.
pub struct KubeDatabaseRequests {
    client: Client,
    namespace: String,
    name: String,
    app: String,
    request: Mutex<DatabaseRequest>,
}

impl KubeDatabaseRequests {
    /// Publish to ConfigMap `name` in `namespace` on behalf of `app`
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
            request: Mutex::new(DatabaseRequest::default()),
        }
    }

    async fn publish(&self, request: &DatabaseRequest) -> Result<(), Error> {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (LABEL_NAME.to_string(), self.app.clone()),
                    (
                        LABEL_MANAGED_BY.to_string(),
                        LABEL_MANAGED_BY_GENERIK8S.to_string(),
                    ),
                ])),
                ..Default::default()
            },
            data: Some(request.to_data()),
            ..Default::default()
        };
        apply_namespaced(&self.client, &self.namespace, &self.name, &cm, FIELD_MANAGER).await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseRequests for KubeDatabaseRequests {
    async fn set_database(&self, name: &str) -> Result<(), Error> {
        let mut request = self.request.lock().await;
        request.database = name.to_string();
        info!(database = %name, "requesting database");
        self.publish(&request).await
    }

    async fn set_extensions(&self, extensions: &BTreeSet<String>) -> Result<(), Error> {
        let mut request = self.request.lock().await;
        request.extensions = extensions.clone();
        info!(?extensions, "requesting database extensions");
        self.publish(&request).await
    }

    async fn set_roles(&self, roles: &BTreeSet<String>) -> Result<(), Error> {
        let mut request = self.request.lock().await;
        request.roles = roles.clone();
        info!(?roles, "requesting database roles");
        self.publish(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_data_joins_sets_in_order() {
        let request = DatabaseRequest {
            database: "app".to_string(),
            extensions: ["pg_trgm", "hstore"].iter().map(|s| s.to_string()).collect(),
            roles: BTreeSet::new(),
        };
        let data = request.to_data();
        assert_eq!(data["database"], "app");
        assert_eq!(data["extensions"], "hstore,pg_trgm");
        assert_eq!(data["roles"], "");
    }
}
