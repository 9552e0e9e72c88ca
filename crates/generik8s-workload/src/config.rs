//! Container config resolution
//!
//! `container_config` and `container_secrets` are YAML documents that must
//! each decode to a mapping. The resolved config keeps keys and values as
//! strings; interpolation works on text and the container environment is
//! text anyway.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::error::WorkloadError;
use crate::options::{ControllerOptions, OptionKey};

/// Uninterpolated container config, keys and values stringified
pub type MergedConfig = BTreeMap<String, String>;

/// Resolve `container_config` alone. This is the secret-free view.
pub fn resolve_sanitized(options: &ControllerOptions) -> Result<MergedConfig, WorkloadError> {
    parse_mapping(OptionKey::ContainerConfig, &options.container_config)
}

/// Resolve `container_config` with `container_secrets` merged over it.
///
/// Secret keys win on collision.
pub fn resolve_full(options: &ControllerOptions) -> Result<MergedConfig, WorkloadError> {
    let mut config = resolve_sanitized(options)?;
    let secrets = parse_mapping(OptionKey::ContainerSecrets, &options.container_secrets)?;
    config.extend(secrets);
    Ok(config)
}

fn parse_mapping(key: OptionKey, document: &str) -> Result<MergedConfig, WorkloadError> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| WorkloadError::malformed(key.as_str(), format!("is not valid YAML: {}", e)))?;

    let Value::Mapping(mapping) = value else {
        return Err(WorkloadError::malformed(key.as_str(), "is not a YAML mapping"));
    };
    mapping
        .iter()
        .map(|(k, v)| {
            let text = |value: &Value| {
                stringify(value).map_err(|e| {
                    WorkloadError::malformed(
                        key.as_str(),
                        format!("has a value that cannot be flattened to text: {}", e),
                    )
                })
            };
            Ok((text(k)?, text(v)?))
        })
        .collect()
}

/// Text form of a YAML value as it lands in the container environment.
///
/// Nested sequences and mappings are kept as compact JSON so they survive
/// the trip into an environment variable. A nested mapping JSON cannot
/// express (one keyed by a list, say) is an error rather than dropped.
fn stringify(value: &Value) -> Result<String, serde_json::Error> {
    Ok(match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => stringify(&tagged.value)?,
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(config: &str, secrets: &str) -> ControllerOptions {
        ControllerOptions {
            container_config: config.to_string(),
            container_secrets: secrets.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_resolve_to_empty_mapping() {
        let opts = ControllerOptions::default();
        assert!(resolve_sanitized(&opts).unwrap().is_empty());
        assert!(resolve_full(&opts).unwrap().is_empty());
    }

    #[test]
    fn secrets_override_config_on_collision() {
        let opts = options("A: plain\nB: base", "B: secret\nC: extra");
        let full = resolve_full(&opts).unwrap();
        assert_eq!(full["A"], "plain");
        assert_eq!(full["B"], "secret");
        assert_eq!(full["C"], "extra");

        let sanitized = resolve_sanitized(&opts).unwrap();
        assert_eq!(sanitized["B"], "base");
        assert!(!sanitized.contains_key("C"));
    }

    #[test]
    fn scalar_values_are_stringified() {
        let opts = options("PORT: 8080\nDEBUG: true\nEMPTY: ~\nRATIO: 0.5", "{}");
        let config = resolve_sanitized(&opts).unwrap();
        assert_eq!(config["PORT"], "8080");
        assert_eq!(config["DEBUG"], "true");
        assert_eq!(config["EMPTY"], "");
        assert_eq!(config["RATIO"], "0.5");
    }

    #[test]
    fn non_string_keys_are_stringified() {
        let config = resolve_sanitized(&options("1: one\ntrue: yes", "{}")).unwrap();
        assert_eq!(config["1"], "one");
        assert_eq!(config["true"], "yes");
    }

    #[test]
    fn nested_values_become_json() {
        let config = resolve_sanitized(&options("HOSTS: [a, b]", "{}")).unwrap();
        assert_eq!(config["HOSTS"], r#"["a","b"]"#);
    }

    #[test]
    fn nested_value_without_json_form_is_malformed() {
        let err = resolve_sanitized(&options("WEIRD:\n  ? [1, 2]\n  : x", "{}")).unwrap_err();
        assert!(matches!(
            err,
            WorkloadError::MalformedConfig { field: "container_config", .. }
        ));
        assert!(err.to_string().contains("cannot be flattened to text"));
    }

    #[test]
    fn scalar_document_is_not_a_mapping() {
        let err = resolve_sanitized(&options("just a string", "{}")).unwrap_err();
        assert_eq!(
            err,
            WorkloadError::malformed("container_config", "is not a YAML mapping")
        );
        assert!(err.to_string().contains("not a YAML mapping"));
    }

    #[test]
    fn list_document_is_not_a_mapping() {
        let err = resolve_sanitized(&options("- a\n- b", "{}")).unwrap_err();
        assert!(matches!(
            err,
            WorkloadError::MalformedConfig { field: "container_config", .. }
        ));
    }

    #[test]
    fn malformed_secrets_only_fail_full_resolution() {
        let opts = options("A: 1", "[oops");
        assert!(resolve_sanitized(&opts).is_ok());
        let err = resolve_full(&opts).unwrap_err();
        match err {
            WorkloadError::MalformedConfig { field, reason } => {
                assert_eq!(field, "container_secrets");
                assert!(reason.starts_with("is not valid YAML"));
            }
            other => panic!("expected MalformedConfig, got {other:?}"),
        }
    }
}
