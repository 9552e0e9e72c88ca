//! Input events and the triggers they fire
//!
//! Triggers are the immediate flag updates an event causes before any
//! handler runs. They are what invalidates earlier decisions: a changed
//! config reopens the dependency gate, a departed database drops the
//! connection, and so on.

use generik8s_workload::{ControllerOptions, OptionKey, RelationEvent};
use tracing::debug;

use crate::flags::{ConvergenceState, Flag};

/// Something that happened outside the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A new options revision
    OptionsChanged(ControllerOptions),
    /// A database connection event
    Relation(RelationEvent),
    /// The controller is running a version different from the one that
    /// last saved the state
    Upgrade,
}

impl Event {
    /// Short event name, for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OptionsChanged(_) => "options_changed",
            Event::Relation(RelationEvent::Connected) => "database_connected",
            Event::Relation(RelationEvent::MasterAvailable(_)) => "database_master_available",
            Event::Relation(RelationEvent::Departed) => "database_departed",
            Event::Upgrade => "upgrade",
        }
    }
}

/// Fold an event into the state and fire its triggers
pub fn apply_triggers(state: &mut ConvergenceState, event: &Event, controller_version: &str) {
    match event {
        Event::OptionsChanged(options) => {
            let changed = options.changed_keys(state.options.as_ref());
            if !changed.is_empty() {
                debug!(
                    changed = ?changed.iter().map(OptionKey::as_str).collect::<Vec<_>>(),
                    "options changed"
                );
                state.set(Flag::OptionsChanged);
            }
            if changed.iter().any(OptionKey::is_container_document) {
                state.clear(Flag::DependencyGateSatisfied);
            }
            if changed.iter().any(OptionKey::is_database_request) {
                state.clear(Flag::DbParamsSet);
            }
            state.options = Some(options.clone());
        }
        Event::Relation(relation) => {
            if state.tracker.apply(relation) {
                state.set(Flag::MasterChanged);
            }
            if matches!(relation, RelationEvent::Departed) {
                state.clear(Flag::DbParamsSet);
            }
            state.toggle(Flag::ConnectionEstablished, state.tracker.is_connected());
            state.toggle(Flag::MasterAvailable, state.tracker.is_available());
        }
        Event::Upgrade => {
            state.clear(Flag::DependencyGateSatisfied);
            state.clear(Flag::SpecApplied);
            state.controller_version = Some(controller_version.to_string());
        }
    }

    // Derived from the options in effect, whatever the event
    state.toggle(Flag::ImageDefault, state.effective_options().is_image_default());
}
