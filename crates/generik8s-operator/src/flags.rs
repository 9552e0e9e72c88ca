//! Convergence flags and persisted state
//!
//! Flags record what the controller has already established about the world
//! (the database gate is open, the spec is applied, ...). They live in an
//! explicit [`ConvergenceState`] that is loaded before a cycle and saved
//! after it. Nothing here is process-global.

use std::collections::BTreeSet;
use std::fmt;

use generik8s_workload::{ConnectionTracker, ControllerOptions};
use serde::{Deserialize, Serialize};

use crate::status::UnitStatus;

/// A named convergence flag
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// The database is either not needed or known to be connected
    DependencyGateSatisfied,
    /// A database peer exists
    ConnectionEstablished,
    /// The database published a complete master endpoint
    MasterAvailable,
    /// The database request (name, extensions, roles) has been published
    DbParamsSet,
    /// The current workload spec has been applied
    SpecApplied,
    /// `image` is at its default (derived each cycle)
    ImageDefault,
    /// Options changed this cycle
    OptionsChanged,
    /// The connection state value changed this cycle
    MasterChanged,
}

impl Flag {
    /// Flags that only live for the cycle that raised them
    pub const TRANSIENT: [Flag; 3] = [Flag::ImageDefault, Flag::OptionsChanged, Flag::MasterChanged];

    /// True for flags cleared at the end of every cycle
    pub fn is_transient(&self) -> bool {
        Self::TRANSIENT.contains(self)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::DependencyGateSatisfied => "dependency_gate_satisfied",
            Flag::ConnectionEstablished => "connection_established",
            Flag::MasterAvailable => "master_available",
            Flag::DbParamsSet => "db_params_set",
            Flag::SpecApplied => "spec_applied",
            Flag::ImageDefault => "image_default",
            Flag::OptionsChanged => "options_changed",
            Flag::MasterChanged => "master_changed",
        };
        f.write_str(name)
    }
}

/// Everything the controller remembers between cycles
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceState {
    flags: BTreeSet<Flag>,
    /// Last options revision seen, `None` before the first one
    pub options: Option<ControllerOptions>,
    /// Database connection view
    pub tracker: ConnectionTracker,
    /// Digest of the last applied workload spec
    pub last_applied: Option<String>,
    /// Controller version that last saved this state
    pub controller_version: Option<String>,
    /// Last surfaced status
    pub status: Option<UnitStatus>,
}

impl ConvergenceState {
    /// True if the flag is set
    pub fn is_set(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    /// Set a flag
    pub fn set(&mut self, flag: Flag) {
        self.flags.insert(flag);
    }

    /// Clear a flag
    pub fn clear(&mut self, flag: Flag) {
        self.flags.remove(&flag);
    }

    /// Set or clear a flag
    pub fn toggle(&mut self, flag: Flag, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    /// All flags currently set
    pub fn flags(&self) -> &BTreeSet<Flag> {
        &self.flags
    }

    /// Drop every per-cycle flag
    pub fn clear_transient(&mut self) {
        self.flags.retain(|f| !f.is_transient());
    }

    /// Options in effect: the last revision seen, or the defaults
    pub fn effective_options(&self) -> ControllerOptions {
        self.options.clone().unwrap_or_default()
    }
}
