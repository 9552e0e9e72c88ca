//! generik8s controller: runs one containerized workload and keeps it
//! converged with its options and its optional PostgreSQL dependency
//!
//! The [`engine::ConvergenceEngine`] is a flag state machine. Every input
//! becomes an [`events::Event`], every event runs one cycle of the
//! [`dispatch`] table, and the resulting [`flags::ConvergenceState`] is
//! persisted through a [`store::StateStore`]. The cluster, the database
//! request and the status are reached through traits so the engine can be
//! driven without a cluster.

#![deny(missing_docs)]

pub mod cluster;
pub mod database;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod flags;
pub mod runner;
pub mod status;
pub mod store;
pub mod watch;

pub use engine::{Context, ConvergenceEngine, CycleOutcome};
pub use error::ReconcileError;
pub use events::Event;
pub use flags::{ConvergenceState, Flag};
pub use status::UnitStatus;
