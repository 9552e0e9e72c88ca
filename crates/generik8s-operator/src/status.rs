//! Unit status
//!
//! Handlers raise statuses as they run; the most severe one raised during a
//! cycle is what the operator sees. Severity runs blocked, waiting,
//! maintenance, active.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status surfaced to the operator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// Needs operator action before anything can proceed
    Blocked(String),
    /// Waiting on an external party, no action needed
    Waiting(String),
    /// Work in progress
    Maintenance(String),
    /// Converged
    Active,
}

impl UnitStatus {
    /// Blocked with a reason
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::Blocked(reason.into())
    }

    /// Waiting with a reason
    pub fn waiting(reason: impl Into<String>) -> Self {
        Self::Waiting(reason.into())
    }

    /// Maintenance with a reason
    pub fn maintenance(reason: impl Into<String>) -> Self {
        Self::Maintenance(reason.into())
    }

    /// Higher is more severe
    pub fn severity(&self) -> u8 {
        match self {
            UnitStatus::Blocked(_) => 3,
            UnitStatus::Waiting(_) => 2,
            UnitStatus::Maintenance(_) => 1,
            UnitStatus::Active => 0,
        }
    }

    /// Lowercase state name
    pub fn state(&self) -> &'static str {
        match self {
            UnitStatus::Blocked(_) => "blocked",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Active => "active",
        }
    }

    /// Human readable message, empty for active
    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Blocked(m) | UnitStatus::Waiting(m) | UnitStatus::Maintenance(m) => m,
            UnitStatus::Active => "",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Active => f.write_str("active"),
            other => write!(f, "{}: {}", other.state(), other.message()),
        }
    }
}

/// Collects the statuses raised during one cycle
#[derive(Debug, Default)]
pub struct StatusAccumulator {
    surfaced: Option<UnitStatus>,
}

impl StatusAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a status.
    ///
    /// A status at least as severe as the current one replaces it, so among
    /// equals the latest message wins.
    pub fn raise(&mut self, status: UnitStatus) {
        let replace = match &self.surfaced {
            Some(current) => status.severity() >= current.severity(),
            None => true,
        };
        if replace {
            self.surfaced = Some(status);
        }
    }

    /// The status to surface, if any was raised
    pub fn finish(self) -> Option<UnitStatus> {
        self.surfaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_severe_status_wins() {
        let mut acc = StatusAccumulator::new();
        acc.raise(UnitStatus::maintenance("configuration changed"));
        acc.raise(UnitStatus::blocked("config item 'image' is required"));
        acc.raise(UnitStatus::waiting("Waiting for postgres relation to complete"));
        assert_eq!(
            acc.finish(),
            Some(UnitStatus::blocked("config item 'image' is required"))
        );
    }

    #[test]
    fn latest_of_equal_severity_wins() {
        let mut acc = StatusAccumulator::new();
        acc.raise(UnitStatus::maintenance("configuration changed"));
        acc.raise(UnitStatus::maintenance("configuring container"));
        assert_eq!(
            acc.finish(),
            Some(UnitStatus::maintenance("configuring container"))
        );
    }

    #[test]
    fn nothing_raised_surfaces_nothing() {
        assert_eq!(StatusAccumulator::new().finish(), None);
    }

    #[test]
    fn display_and_parts() {
        let status = UnitStatus::blocked("postgres relation is required");
        assert_eq!(status.state(), "blocked");
        assert_eq!(status.to_string(), "blocked: postgres relation is required");
        assert_eq!(UnitStatus::Active.to_string(), "active");
        assert_eq!(UnitStatus::Active.message(), "");
    }

    #[test]
    fn serializes_with_state_tag() {
        let json = serde_json::to_string(&UnitStatus::waiting("w")).unwrap();
        assert_eq!(json, r#"{"state":"waiting","message":"w"}"#);
        let back: UnitStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UnitStatus::waiting("w"));
    }
}
