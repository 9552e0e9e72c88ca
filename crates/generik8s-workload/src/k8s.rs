//! Kubernetes rendering of a workload spec
//!
//! A spec becomes two resources: a Secret holding the full container config
//! and a single-replica Deployment that loads it through `envFrom`. The pod
//! template carries a hash of the config so a config change rolls the pods
//! even though the Deployment itself only references the Secret by name.

use std::collections::BTreeMap;

use generik8s_common::kube_utils::deterministic_hash;
use generik8s_common::{
    CONFIG_HASH_ANNOTATION, LABEL_MANAGED_BY, LABEL_MANAGED_BY_GENERIK8S, LABEL_NAME,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort as K8sContainerPort, EnvFromSource, PodSpec, PodTemplateSpec, Secret,
    SecretEnvSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::interpolate::InterpolatedConfig;
use crate::spec::{push_config, WorkloadSpec};

/// Resources rendered from one workload spec
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadResources {
    /// Secret carrying the container config
    pub config_secret: Secret,
    /// Deployment running the container
    pub deployment: Deployment,
}

/// Name of the Secret carrying the container config for `app`
pub fn config_secret_name(app: &str) -> String {
    format!("{}-container-config", app)
}

/// Hash of the container config, stamped on the pod template
pub fn compute_config_hash(config: &InterpolatedConfig) -> String {
    let mut data = String::new();
    push_config(&mut data, config);
    deterministic_hash(&data)
}

fn labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), app.to_string()),
        (
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_GENERIK8S.to_string(),
        ),
    ])
}

/// Render a spec into the resources that run it
pub fn render(spec: &WorkloadSpec, namespace: &str) -> WorkloadResources {
    let app = spec.container_name.as_str();
    let secret_name = config_secret_name(app);
    let labels = labels(app);

    let config_secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        string_data: Some(spec.config.clone()),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };

    let ports: Vec<K8sContainerPort> = spec
        .ports
        .iter()
        .map(|p| K8sContainerPort {
            name: Some(p.name.clone()),
            container_port: i32::from(p.container_port),
            protocol: Some(p.protocol.clone()),
            ..Default::default()
        })
        .collect();

    let container = Container {
        name: app.to_string(),
        image: Some(spec.image.clone()),
        ports: (!ports.is_empty()).then_some(ports),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret_name,
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(app.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    LABEL_NAME.to_string(),
                    app.to_string(),
                )])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(BTreeMap::from([(
                        CONFIG_HASH_ANNOTATION.to_string(),
                        compute_config_hash(&spec.config),
                    )])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    WorkloadResources {
        config_secret,
        deployment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ContainerPort;

    fn spec(config: &[(&str, &str)]) -> WorkloadSpec {
        WorkloadSpec {
            container_name: "myapp".to_string(),
            image: "registry.example/myapp:1.2".to_string(),
            ports: vec![ContainerPort {
                name: "web".to_string(),
                container_port: 80,
                protocol: "TCP".to_string(),
            }],
            config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn pod_template(resources: &WorkloadResources) -> &PodTemplateSpec {
        &resources.deployment.spec.as_ref().unwrap().template
    }

    #[test]
    fn secret_carries_full_config() {
        let resources = render(&spec(&[("DATABASE_URL", "postgresql://x")]), "apps");
        let secret = &resources.config_secret;
        assert_eq!(secret.metadata.name.as_deref(), Some("myapp-container-config"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("apps"));
        assert_eq!(
            secret.string_data.as_ref().unwrap()["DATABASE_URL"],
            "postgresql://x"
        );
    }

    #[test]
    fn deployment_runs_one_container_from_the_secret() {
        let resources = render(&spec(&[]), "apps");
        let deployment = &resources.deployment;
        assert_eq!(deployment.metadata.name.as_deref(), Some("myapp"));
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(1));

        let pod = pod_template(&resources).spec.as_ref().unwrap();
        assert_eq!(pod.containers.len(), 1);
        let container = &pod.containers[0];
        assert_eq!(container.name, "myapp");
        assert_eq!(container.image.as_deref(), Some("registry.example/myapp:1.2"));

        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports[0].container_port, 80);
        assert_eq!(ports[0].name.as_deref(), Some("web"));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));

        let env_from = container.env_from.as_ref().unwrap();
        assert_eq!(
            env_from[0].secret_ref.as_ref().unwrap().name,
            "myapp-container-config"
        );
    }

    #[test]
    fn selector_matches_pod_labels() {
        let resources = render(&spec(&[]), "apps");
        let selector = resources
            .deployment
            .spec
            .as_ref()
            .unwrap()
            .selector
            .match_labels
            .clone()
            .unwrap();
        let pod_labels = pod_template(&resources)
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .clone()
            .unwrap();
        for (k, v) in selector {
            assert_eq!(pod_labels.get(&k), Some(&v));
        }
        assert_eq!(pod_labels[LABEL_MANAGED_BY], "generik8s");
    }

    #[test]
    fn no_ports_renders_no_port_list() {
        let mut s = spec(&[]);
        s.ports.clear();
        let resources = render(&s, "apps");
        let pod = pod_template(&resources).spec.as_ref().unwrap();
        assert!(pod.containers[0].ports.is_none());
    }

    // =========================================================================
    // Story: config changes roll the pods
    // =========================================================================

    #[test]
    fn story_config_change_changes_pod_template_hash() {
        let hash = |r: &WorkloadResources| {
            pod_template(r).metadata.as_ref().unwrap().annotations.as_ref().unwrap()
                [CONFIG_HASH_ANNOTATION]
                .clone()
        };

        let before = render(&spec(&[("PGHOST", "")]), "apps");
        let same = render(&spec(&[("PGHOST", "")]), "apps");
        assert_eq!(hash(&before), hash(&same));

        // Database details arrive: only the Secret content moved, but the
        // template hash changes with it
        let after = render(&spec(&[("PGHOST", "db.internal")]), "apps");
        assert_ne!(hash(&before), hash(&after));
        assert_eq!(hash(&after).len(), 16);
    }

    #[test]
    fn story_values_cannot_forge_entry_boundaries() {
        // A value that embeds what looks like another entry is a different
        // config and must roll the pods
        let joined = spec(&[("A", "x\nB=y")]);
        let split = spec(&[("A", "x"), ("B", "y")]);
        assert_ne!(
            compute_config_hash(&joined.config),
            compute_config_hash(&split.config)
        );

        let moved = spec(&[("AB", "")]);
        let empty = spec(&[("A", "B")]);
        assert_ne!(
            compute_config_hash(&moved.config),
            compute_config_hash(&empty.config)
        );
    }
}
