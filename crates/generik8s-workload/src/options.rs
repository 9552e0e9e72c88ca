//! Controller options
//!
//! The operator-facing knobs, one string per option. A new revision of the
//! options replaces the previous one as a whole; [`ControllerOptions::changed_keys`]
//! is how the controller learns which knobs moved.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default for `image`. An image left at this value blocks the controller.
pub const DEFAULT_IMAGE: &str = "";

/// Default for `container_config` and `container_secrets`: an empty mapping
pub const DEFAULT_CONTAINER_DOCUMENT: &str = "{}";

/// Recognized controller options
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Container image to run (required)
    pub image: String,
    /// Whitespace-separated `name:port` tokens
    pub ports: String,
    /// YAML mapping rendered into the container environment
    pub container_config: String,
    /// YAML mapping merged over `container_config`; never logged
    pub container_secrets: String,
    /// Database name requested from the PostgreSQL dependency
    pub pgdatabase: String,
    /// Comma-separated extensions requested from the PostgreSQL dependency
    pub pgextensions: String,
    /// Comma-separated roles requested from the PostgreSQL dependency
    pub pgroles: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            ports: String::new(),
            container_config: DEFAULT_CONTAINER_DOCUMENT.to_string(),
            container_secrets: DEFAULT_CONTAINER_DOCUMENT.to_string(),
            pgdatabase: String::new(),
            pgextensions: String::new(),
            pgroles: String::new(),
        }
    }
}

/// Names of the recognized options, used to report what changed between revisions
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    /// `image`
    Image,
    /// `ports`
    Ports,
    /// `container_config`
    ContainerConfig,
    /// `container_secrets`
    ContainerSecrets,
    /// `pgdatabase`
    Pgdatabase,
    /// `pgextensions`
    Pgextensions,
    /// `pgroles`
    Pgroles,
}

impl OptionKey {
    /// Every recognized option
    pub const ALL: [OptionKey; 7] = [
        OptionKey::Image,
        OptionKey::Ports,
        OptionKey::ContainerConfig,
        OptionKey::ContainerSecrets,
        OptionKey::Pgdatabase,
        OptionKey::Pgextensions,
        OptionKey::Pgroles,
    ];

    /// The option name as it appears in the options ConfigMap
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::Image => "image",
            OptionKey::Ports => "ports",
            OptionKey::ContainerConfig => "container_config",
            OptionKey::ContainerSecrets => "container_secrets",
            OptionKey::Pgdatabase => "pgdatabase",
            OptionKey::Pgextensions => "pgextensions",
            OptionKey::Pgroles => "pgroles",
        }
    }

    /// True for options that feed the container config documents
    pub fn is_container_document(&self) -> bool {
        matches!(self, OptionKey::ContainerConfig | OptionKey::ContainerSecrets)
    }

    /// True for options that are published to the database dependency
    pub fn is_database_request(&self) -> bool {
        matches!(
            self,
            OptionKey::Pgdatabase | OptionKey::Pgextensions | OptionKey::Pgroles
        )
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ControllerOptions {
    /// Build options from ConfigMap-style string data.
    ///
    /// Missing keys take their defaults; unknown keys are ignored.
    pub fn from_data(data: &BTreeMap<String, String>) -> Self {
        let mut options = Self::default();
        for key in OptionKey::ALL {
            if let Some(value) = data.get(key.as_str()) {
                *options.value_mut(key) = value.clone();
            }
        }
        options
    }

    /// Replace `container_secrets` when a secrets document is supplied separately
    pub fn with_container_secrets(mut self, secrets: Option<String>) -> Self {
        if let Some(secrets) = secrets {
            self.container_secrets = secrets;
        }
        self
    }

    /// Current value of an option
    pub fn value(&self, key: OptionKey) -> &str {
        match key {
            OptionKey::Image => &self.image,
            OptionKey::Ports => &self.ports,
            OptionKey::ContainerConfig => &self.container_config,
            OptionKey::ContainerSecrets => &self.container_secrets,
            OptionKey::Pgdatabase => &self.pgdatabase,
            OptionKey::Pgextensions => &self.pgextensions,
            OptionKey::Pgroles => &self.pgroles,
        }
    }

    fn value_mut(&mut self, key: OptionKey) -> &mut String {
        match key {
            OptionKey::Image => &mut self.image,
            OptionKey::Ports => &mut self.ports,
            OptionKey::ContainerConfig => &mut self.container_config,
            OptionKey::ContainerSecrets => &mut self.container_secrets,
            OptionKey::Pgdatabase => &mut self.pgdatabase,
            OptionKey::Pgextensions => &mut self.pgextensions,
            OptionKey::Pgroles => &mut self.pgroles,
        }
    }

    /// Options whose value differs from the previous revision.
    ///
    /// With no previous revision every option counts as changed.
    pub fn changed_keys(&self, previous: Option<&ControllerOptions>) -> BTreeSet<OptionKey> {
        OptionKey::ALL
            .into_iter()
            .filter(|key| match previous {
                Some(prev) => prev.value(*key) != self.value(*key),
                None => true,
            })
            .collect()
    }

    /// True while `image` is left at its default
    pub fn is_image_default(&self) -> bool {
        self.image.trim() == DEFAULT_IMAGE
    }

    /// Requested extensions, empty entries dropped
    pub fn extensions(&self) -> BTreeSet<String> {
        split_list(&self.pgextensions)
    }

    /// Requested roles, empty entries dropped
    pub fn roles(&self) -> BTreeSet<String> {
        split_list(&self.pgroles)
    }
}

fn split_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_keys_take_defaults() {
        let options = ControllerOptions::from_data(&data(&[("image", "nginx:1.27")]));
        assert_eq!(options.image, "nginx:1.27");
        assert_eq!(options.container_config, "{}");
        assert_eq!(options.container_secrets, "{}");
        assert_eq!(options.ports, "");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options = ControllerOptions::from_data(&data(&[("replicas", "3")]));
        assert_eq!(options, ControllerOptions::default());
    }

    #[test]
    fn default_image_is_detected() {
        assert!(ControllerOptions::default().is_image_default());
        let options = ControllerOptions::from_data(&data(&[("image", "  ")]));
        assert!(options.is_image_default());
        let options = ControllerOptions::from_data(&data(&[("image", "x")]));
        assert!(!options.is_image_default());
    }

    #[test]
    fn first_revision_changes_every_key() {
        let options = ControllerOptions::default();
        assert_eq!(options.changed_keys(None).len(), OptionKey::ALL.len());
    }

    #[test]
    fn changed_keys_reports_only_differences() {
        let before = ControllerOptions::from_data(&data(&[("image", "a"), ("pgroles", "r1")]));
        let after = ControllerOptions::from_data(&data(&[("image", "b"), ("pgroles", "r1")]));
        let changed = after.changed_keys(Some(&before));
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec![OptionKey::Image]);
        assert!(after.changed_keys(Some(&after)).is_empty());
    }

    #[test]
    fn secrets_document_overrides_inline_value() {
        let options = ControllerOptions::from_data(&data(&[("container_secrets", "a: 1")]))
            .with_container_secrets(Some("b: 2".to_string()));
        assert_eq!(options.container_secrets, "b: 2");

        let options = ControllerOptions::default().with_container_secrets(None);
        assert_eq!(options.container_secrets, "{}");
    }

    #[test]
    fn list_options_drop_empty_entries() {
        let options = ControllerOptions::from_data(&data(&[
            ("pgextensions", "citext, hstore,,"),
            ("pgroles", ""),
        ]));
        assert_eq!(
            options.extensions().into_iter().collect::<Vec<_>>(),
            vec!["citext".to_string(), "hstore".to_string()]
        );
        assert!(options.roles().is_empty());
    }

    #[test]
    fn option_key_classification() {
        assert!(OptionKey::ContainerSecrets.is_container_document());
        assert!(!OptionKey::Ports.is_container_document());
        assert!(OptionKey::Pgroles.is_database_request());
        assert!(!OptionKey::Image.is_database_request());
        assert_eq!(OptionKey::Pgextensions.to_string(), "pgextensions");
    }
}
