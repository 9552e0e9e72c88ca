//! Handler dispatch table
//!
//! Each handler declares the flags it needs set (`when`), needs clear
//! (`when_none`), and needs at least one of (`when_any`). The table is in
//! priority order: on every pass the first ready handler that has not run
//! yet this cycle is picked, so a handler that flips a flag can make an
//! earlier or later handler ready.

use crate::flags::{ConvergenceState, Flag};

/// Convergence handlers, in priority order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Handler {
    /// Block while `image` is unset
    BlockOnImage,
    /// Decide whether the database is needed before anything is applied
    GateDatabase,
    /// Wait for a connected database to publish its endpoint
    WaitForDatabase,
    /// React to changed connection details
    DatabaseReconfig,
    /// React to changed options
    OptionsReconfig,
    /// Publish the database request
    PublishDatabaseRequest,
    /// Log the connection details
    LogConnection,
    /// Build and apply the workload spec
    ConfigureContainer,
}

/// Flag preconditions of a handler
#[derive(Clone, Copy, Debug)]
pub struct Preconditions {
    /// Every flag must be set
    pub when: &'static [Flag],
    /// No flag may be set
    pub when_none: &'static [Flag],
    /// At least one flag must be set (ignored when empty)
    pub when_any: &'static [Flag],
}

impl Preconditions {
    /// True if the preconditions hold in `state`
    pub fn hold(&self, state: &ConvergenceState) -> bool {
        self.when.iter().all(|f| state.is_set(*f))
            && !self.when_none.iter().any(|f| state.is_set(*f))
            && (self.when_any.is_empty() || self.when_any.iter().any(|f| state.is_set(*f)))
    }
}

/// The dispatch table
pub const HANDLERS: [(Handler, Preconditions); 8] = [
    (
        Handler::BlockOnImage,
        Preconditions {
            when: &[Flag::ImageDefault],
            when_none: &[],
            when_any: &[],
        },
    ),
    (
        Handler::GateDatabase,
        Preconditions {
            when: &[],
            when_none: &[Flag::ConnectionEstablished, Flag::DependencyGateSatisfied],
            when_any: &[],
        },
    ),
    (
        Handler::WaitForDatabase,
        Preconditions {
            when: &[Flag::ConnectionEstablished],
            when_none: &[Flag::MasterAvailable, Flag::DependencyGateSatisfied],
            when_any: &[],
        },
    ),
    (
        Handler::DatabaseReconfig,
        Preconditions {
            when: &[Flag::MasterChanged],
            when_none: &[Flag::DependencyGateSatisfied],
            when_any: &[],
        },
    ),
    (
        Handler::OptionsReconfig,
        Preconditions {
            when: &[Flag::OptionsChanged],
            when_none: &[],
            when_any: &[],
        },
    ),
    (
        Handler::PublishDatabaseRequest,
        Preconditions {
            when: &[Flag::ConnectionEstablished],
            when_none: &[Flag::DbParamsSet],
            when_any: &[],
        },
    ),
    (
        Handler::LogConnection,
        Preconditions {
            when: &[Flag::ConnectionEstablished],
            when_none: &[],
            when_any: &[],
        },
    ),
    (
        Handler::ConfigureContainer,
        Preconditions {
            when: &[],
            when_none: &[Flag::SpecApplied, Flag::ImageDefault],
            when_any: &[Flag::ConnectionEstablished, Flag::DependencyGateSatisfied],
        },
    ),
];

impl Handler {
    /// Handler name, for log fields
    pub fn name(&self) -> &'static str {
        match self {
            Handler::BlockOnImage => "block_on_image",
            Handler::GateDatabase => "gate_database",
            Handler::WaitForDatabase => "wait_for_database",
            Handler::DatabaseReconfig => "database_reconfig",
            Handler::OptionsReconfig => "options_reconfig",
            Handler::PublishDatabaseRequest => "publish_database_request",
            Handler::LogConnection => "log_connection",
            Handler::ConfigureContainer => "configure_container",
        }
    }
}

/// First ready handler, in table order, that is not in `ran`
pub fn next_ready(state: &ConvergenceState, ran: &[Handler]) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(h, p)| !ran.contains(h) && p.hold(state))
        .map(|(h, _)| *h)
}
