//! Cluster watchers
//!
//! Each watcher follows one named object and turns its changes into
//! [`Input`]s on the controller queue. Objects missing from a (re)list are
//! reported the same way as a deletion.

use std::collections::BTreeMap;
use std::fmt::Debug;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use generik8s_workload::{MasterRecord, OptionKey, RelationEvent};

/// Watch timeout (seconds), kept below the client read timeout so idle
/// watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Keys of the database Secret that make up the master record
pub const MASTER_KEYS: [&str; 6] = ["host", "dbname", "port", "user", "password", "uri"];

/// Which watcher an input came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Options ConfigMap
    Options,
    /// Secrets Secret
    Secrets,
    /// Database Secret
    Database,
}

/// A change observed in the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Options ConfigMap data; empty when the ConfigMap is gone
    Options(BTreeMap<String, String>),
    /// `container_secrets` document from the secrets Secret, `None` when absent
    Secrets(Option<String>),
    /// Database connection event
    Database(RelationEvent),
    /// A watcher finished listing its object
    Synced(Source),
}

fn decode_secret_data(secret: &Secret) -> BTreeMap<String, String> {
    let Some(data) = secret.data.as_ref() else {
        return BTreeMap::new();
    };
    data.iter()
        .filter_map(|(k, ByteString(bytes))| match String::from_utf8(bytes.clone()) {
            Ok(v) => Some((k.clone(), v)),
            Err(_) => {
                warn!(key = %k, "secret value is not UTF-8, ignoring");
                None
            }
        })
        .collect()
}

/// Input for a present options ConfigMap
pub fn options_applied(cm: &ConfigMap) -> Vec<Input> {
    vec![Input::Options(cm.data.clone().unwrap_or_default())]
}

/// Input for a missing options ConfigMap
pub fn options_deleted() -> Vec<Input> {
    vec![Input::Options(BTreeMap::new())]
}

/// Input for a present secrets Secret
pub fn secrets_applied(secret: &Secret) -> Vec<Input> {
    let mut data = decode_secret_data(secret);
    vec![Input::Secrets(data.remove(OptionKey::ContainerSecrets.as_str()))]
}

/// Input for a missing secrets Secret
pub fn secrets_deleted() -> Vec<Input> {
    vec![Input::Secrets(None)]
}

/// Inputs for a present database Secret.
///
/// A Secret without any master key only says a peer exists.
pub fn database_applied(secret: &Secret) -> Vec<Input> {
    let data = decode_secret_data(secret);
    let event = if MASTER_KEYS.iter().any(|k| data.contains_key(*k)) {
        RelationEvent::MasterAvailable(MasterRecord::from_data(&data))
    } else {
        RelationEvent::Connected
    };
    vec![Input::Database(event)]
}

/// Inputs for a missing database Secret
pub fn database_deleted() -> Vec<Input> {
    vec![Input::Database(RelationEvent::Departed)]
}

/// Spawn a watcher on the object `name` that feeds `tx`
pub fn spawn_watch<K>(
    api: Api<K>,
    name: String,
    source: Source,
    tx: mpsc::Sender<Input>,
    on_apply: fn(&K) -> Vec<Input>,
    on_delete: fn() -> Vec<Input>,
) -> JoinHandle<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    tokio::spawn(async move {
        let config = watcher::Config::default()
            .fields(&format!("metadata.name={}", name))
            .timeout(WATCH_TIMEOUT_SECS);
        let mut stream = watcher::watcher(api, config).default_backoff().boxed();
        let mut seen = false;

        info!(?source, %name, "starting watcher");
        while let Some(event) = stream.next().await {
            let inputs = match event {
                Ok(WatchEvent::Init) => {
                    seen = false;
                    continue;
                }
                Ok(WatchEvent::InitApply(obj)) => {
                    seen = true;
                    on_apply(&obj)
                }
                Ok(WatchEvent::InitDone) => {
                    let mut inputs = if seen { Vec::new() } else { on_delete() };
                    inputs.push(Input::Synced(source));
                    inputs
                }
                Ok(WatchEvent::Apply(obj)) => on_apply(&obj),
                Ok(WatchEvent::Delete(_)) => on_delete(),
                Err(e) => {
                    warn!(error = %e, ?source, "watch error, will retry");
                    continue;
                }
            };
            for input in inputs {
                if tx.send(input).await.is_err() {
                    debug!(?source, "controller queue closed, stopping watcher");
                    return;
                }
            }
        }
        info!(?source, "watcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn secret(pairs: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("s".to_string()),
                ..Default::default()
            },
            data: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn options_configmap_data_passes_through() {
        let cm = ConfigMap {
            data: Some(BTreeMap::from([("image".to_string(), "x".to_string())])),
            ..Default::default()
        };
        assert_eq!(
            options_applied(&cm),
            vec![Input::Options(BTreeMap::from([(
                "image".to_string(),
                "x".to_string()
            )]))]
        );
        assert_eq!(options_applied(&ConfigMap::default()), options_deleted());
    }

    #[test]
    fn secrets_document_is_read_from_its_key() {
        let inputs = secrets_applied(&secret(&[("container_secrets", "TOKEN: t")]));
        assert_eq!(inputs, vec![Input::Secrets(Some("TOKEN: t".to_string()))]);

        let inputs = secrets_applied(&secret(&[("other", "x")]));
        assert_eq!(inputs, vec![Input::Secrets(None)]);
    }

    #[test]
    fn database_secret_without_master_keys_is_a_connection() {
        assert_eq!(
            database_applied(&secret(&[])),
            vec![Input::Database(RelationEvent::Connected)]
        );
    }

    #[test]
    fn database_secret_with_master_keys_is_a_record() {
        let inputs = database_applied(&secret(&[("host", "db"), ("port", "5432")]));
        match &inputs[..] {
            [Input::Database(RelationEvent::MasterAvailable(record))] => {
                assert_eq!(record.host.as_deref(), Some("db"));
                assert_eq!(record.port.as_deref(), Some("5432"));
                assert_eq!(record.password, None);
            }
            other => panic!("unexpected inputs {other:?}"),
        }
    }

    #[test]
    fn non_utf8_values_are_dropped() {
        let mut s = secret(&[("host", "db")]);
        s.data
            .as_mut()
            .unwrap()
            .insert("password".to_string(), ByteString(vec![0xff, 0xfe]));
        let data = decode_secret_data(&s);
        assert_eq!(data.len(), 1);
        assert!(!data.contains_key("password"));
    }

    #[test]
    fn deleted_database_departs() {
        assert_eq!(
            database_deleted(),
            vec![Input::Database(RelationEvent::Departed)]
        );
    }
}
