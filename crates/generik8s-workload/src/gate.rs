//! Database dependency gate
//!
//! The PostgreSQL dependency is optional. It is only required when the
//! uninterpolated container config references one of its placeholders, so a
//! workload that never mentions `$PG...` is never held back waiting for it.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::{resolve_full, MergedConfig};
use crate::options::ControllerOptions;

/// `$PGHOST`, `${pguri}` and friends, case-insensitive
static PG_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$\{?PG\w+\}?").expect("placeholder pattern is valid"));

/// True if any config value references a database placeholder.
///
/// Only values are scanned; keys are never interpolated.
pub fn is_dependency_referenced(config: &MergedConfig) -> bool {
    config.values().any(|v| PG_PLACEHOLDER.is_match(v))
}

/// True if the options require the database dependency.
///
/// A config that fails to resolve does not require the database. The
/// resolution failure is reported elsewhere, and waiting on the database
/// would never unblock it.
pub fn database_required(options: &ControllerOptions) -> bool {
    match resolve_full(options) {
        Ok(config) => is_dependency_referenced(&config),
        Err(e) => {
            debug!(error = %e, "container config does not resolve, database not required");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(pairs: &[(&str, &str)]) -> MergedConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case::braced_uri("${PGURI}")]
    #[case::bare_host("$PGHOST")]
    #[case::lowercase("${pghost}")]
    #[case::mixed_case("$PgPassword")]
    #[case::embedded("postgres://$PGUSER:${PGPASSWORD}@$PGHOST/db")]
    #[case::unknown_pg_name("$PGANYTHING")]
    #[case::unclosed_brace("${PGPORT")]
    fn referenced_placeholders_require_database(#[case] value: &str) {
        assert!(is_dependency_referenced(&config(&[("DB_URL", value)])));
    }

    #[rstest]
    #[case::literal("postgres-literal")]
    #[case::no_dollar("PGHOST")]
    #[case::other_placeholder("${HOME}")]
    #[case::pg_without_suffix("$PG")]
    #[case::escaped_space("$ PGHOST")]
    #[case::empty("")]
    fn other_values_do_not_require_database(#[case] value: &str) {
        assert!(!is_dependency_referenced(&config(&[("DB_URL", value)])));
    }

    #[test]
    fn keys_are_not_scanned() {
        assert!(!is_dependency_referenced(&config(&[("$PGHOST", "value")])));
    }

    #[test]
    fn empty_config_does_not_require_database() {
        assert!(!is_dependency_referenced(&MergedConfig::new()));
    }

    #[test]
    fn placeholder_in_secrets_requires_database() {
        let options = ControllerOptions {
            container_config: "A: plain".to_string(),
            container_secrets: "DATABASE_URL: ${PGURI}".to_string(),
            ..Default::default()
        };
        assert!(database_required(&options));
    }

    #[test]
    fn unresolvable_config_does_not_require_database() {
        let options = ControllerOptions {
            container_config: "not a mapping".to_string(),
            container_secrets: "DATABASE_URL: ${PGURI}".to_string(),
            ..Default::default()
        };
        assert!(!database_required(&options));
    }
}
