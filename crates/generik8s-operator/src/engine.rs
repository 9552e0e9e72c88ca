//! Convergence engine
//!
//! One event is one cycle:
//!
//! 1. fold the event into a copy of the state and fire its triggers
//! 2. run ready handlers from the dispatch table until none is left, each
//!    handler at most once
//! 3. drop per-cycle flags, surface the most severe status raised
//! 4. persist the new state and adopt it
//!
//! No handler runs before the first options revision is known; until then
//! events only fold into the state.
//!
//! If a collaborator fails in any step the cycle is abandoned: the error is
//! returned, nothing is persisted and the in-memory state is left as it was
//! before the event, so redelivering the event repeats the cycle. The one
//! exception is a spec that already reached the cluster: its digest is kept
//! so the redelivered cycle does not apply it again.

use std::sync::Arc;

use generik8s_workload::{database_required, ConnectionState, SpecBuilder};
use tracing::{debug, info, instrument, warn};

use crate::cluster::WorkloadApplier;
use crate::database::DatabaseRequests;
use crate::dispatch::{next_ready, Handler};
use crate::error::ReconcileError;
use crate::events::{apply_triggers, Event};
use crate::flags::{ConvergenceState, Flag};
use crate::status::{StatusAccumulator, UnitStatus};
use crate::store::{StateStore, StatusReporter};

/// Version stamped into the persisted state
pub const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status messages raised by the handlers
pub mod messages {
    /// `image` left at its default
    pub const IMAGE_REQUIRED: &str = "config item 'image' is required";
    /// Config references the database but none is connected
    pub const POSTGRES_REQUIRED: &str = "postgres relation is required";
    /// Database connected, endpoint not yet published
    pub const WAITING_FOR_POSTGRES: &str = "Waiting for postgres relation to complete";
    /// Connection details changed
    pub const POSTGRES_CHANGED: &str = "PostgreSQL connection details changed";
    /// Options changed
    pub const CONFIG_CHANGED: &str = "configuration changed";
    /// A new spec is being applied
    pub const CONFIGURING: &str = "configuring container";
}

/// Collaborators and identity of the controlled application
#[derive(Clone)]
pub struct Context {
    /// Application (and container) name
    pub app_name: String,
    /// Running controller version
    pub controller_version: String,
    /// Applies the workload spec
    pub applier: Arc<dyn WorkloadApplier>,
    /// Publishes the database request
    pub database: Arc<dyn DatabaseRequests>,
    /// Persists the convergence state
    pub store: Arc<dyn StateStore>,
    /// Surfaces the status
    pub status: Arc<dyn StatusReporter>,
}

impl Context {
    /// Context for the running controller version
    pub fn new(
        app_name: impl Into<String>,
        applier: Arc<dyn WorkloadApplier>,
        database: Arc<dyn DatabaseRequests>,
        store: Arc<dyn StateStore>,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            controller_version: CONTROLLER_VERSION.to_string(),
            applier,
            database,
            store,
            status,
        }
    }

    /// Override the controller version
    pub fn with_controller_version(mut self, version: impl Into<String>) -> Self {
        self.controller_version = version.into();
        self
    }
}

/// What one cycle did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Handlers that ran, in order
    pub ran: Vec<Handler>,
    /// True if a spec was applied
    pub applied: bool,
    /// Status surfaced by the cycle, `None` if it left the status alone
    pub status: Option<UnitStatus>,
}

struct Cycle {
    ran: Vec<Handler>,
    applied: bool,
    status: StatusAccumulator,
}

/// The flag state machine driving the controller
pub struct ConvergenceEngine {
    ctx: Context,
    builder: SpecBuilder,
    state: ConvergenceState,
}

impl ConvergenceEngine {
    /// Create an engine from the persisted state, or the initial state on
    /// first run
    pub async fn load(ctx: Context) -> Result<Self, ReconcileError> {
        let state = ctx
            .store
            .load()
            .await
            .map_err(|source| ReconcileError::Store { source })?
            .unwrap_or_default();
        debug!(flags = ?state.flags(), "convergence state loaded");
        Ok(Self::with_state(ctx, state))
    }

    /// Create an engine from a given state
    pub fn with_state(ctx: Context, state: ConvergenceState) -> Self {
        let builder = SpecBuilder::new(ctx.app_name.clone());
        Self { ctx, builder, state }
    }

    /// Current state
    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// True when the state was saved by a different controller version (or
    /// never saved), meaning an [`Event::Upgrade`] is due
    pub fn needs_upgrade(&self) -> bool {
        self.state.controller_version.as_deref() != Some(self.ctx.controller_version.as_str())
    }

    /// Run one cycle for `event`
    #[instrument(skip(self, event), fields(app = %self.ctx.app_name, event = event.kind()))]
    pub async fn handle(&mut self, event: Event) -> Result<CycleOutcome, ReconcileError> {
        let mut next = self.state.clone();
        apply_triggers(&mut next, &event, &self.ctx.controller_version);

        let mut cycle = Cycle {
            ran: Vec::new(),
            applied: false,
            status: StatusAccumulator::new(),
        };
        if next.options.is_some() {
            while let Some(handler) = next_ready(&next, &cycle.ran) {
                cycle.ran.push(handler);
                debug!(handler = handler.name(), "running handler");
                self.run(handler, &mut next, &mut cycle).await?;
            }
        } else {
            debug!("options not known yet, handlers deferred");
        }
        next.clear_transient();

        let status = match cycle.status.finish() {
            Some(status) => Some(status),
            None if next.is_set(Flag::SpecApplied) => Some(UnitStatus::Active),
            None => None,
        };
        if let Err(e) = self.commit(&mut next, status.as_ref()).await {
            if cycle.applied {
                warn!(error = %e, "cycle failed after the spec was applied");
                self.state.last_applied = next.last_applied;
            }
            return Err(e);
        }
        self.state = next;

        Ok(CycleOutcome {
            ran: cycle.ran,
            applied: cycle.applied,
            status,
        })
    }

    /// Surface the status if it changed, then persist the state if it changed
    async fn commit(
        &self,
        next: &mut ConvergenceState,
        status: Option<&UnitStatus>,
    ) -> Result<(), ReconcileError> {
        if let Some(status) = status {
            if next.status.as_ref() != Some(status) {
                self.ctx
                    .status
                    .report(status)
                    .await
                    .map_err(|source| ReconcileError::Status { source })?;
                info!(status = %status, "status changed");
                next.status = Some(status.clone());
            }
        }

        if *next != self.state {
            self.ctx
                .store
                .save(next)
                .await
                .map_err(|source| ReconcileError::Store { source })?;
        }
        Ok(())
    }

    async fn run(
        &self,
        handler: Handler,
        state: &mut ConvergenceState,
        cycle: &mut Cycle,
    ) -> Result<(), ReconcileError> {
        match handler {
            Handler::BlockOnImage => {
                cycle.status.raise(UnitStatus::blocked(messages::IMAGE_REQUIRED));
            }
            Handler::GateDatabase => {
                if database_required(&state.effective_options()) {
                    info!("container config references the database, which is not connected");
                    cycle.status.raise(UnitStatus::blocked(messages::POSTGRES_REQUIRED));
                } else {
                    debug!("database not required");
                    state.set(Flag::DependencyGateSatisfied);
                }
            }
            Handler::WaitForDatabase => {
                cycle
                    .status
                    .raise(UnitStatus::waiting(messages::WAITING_FOR_POSTGRES));
            }
            Handler::DatabaseReconfig => {
                cycle
                    .status
                    .raise(UnitStatus::maintenance(messages::POSTGRES_CHANGED));
                state.clear(Flag::MasterChanged);
                state.clear(Flag::SpecApplied);
            }
            Handler::OptionsReconfig => {
                cycle
                    .status
                    .raise(UnitStatus::maintenance(messages::CONFIG_CHANGED));
                state.clear(Flag::SpecApplied);
            }
            Handler::PublishDatabaseRequest => {
                self.publish_database_request(state).await?;
                state.set(Flag::DbParamsSet);
            }
            Handler::LogConnection => log_connection(state.tracker.current()),
            Handler::ConfigureContainer => self.configure_container(state, cycle).await?,
        }
        Ok(())
    }

    async fn publish_database_request(
        &self,
        state: &ConvergenceState,
    ) -> Result<(), ReconcileError> {
        let options = state.effective_options();
        let db = &self.ctx.database;
        let to_err = |source| ReconcileError::DatabaseRequest { source };
        db.set_database(&options.pgdatabase).await.map_err(to_err)?;
        db.set_extensions(&options.extensions()).await.map_err(to_err)?;
        db.set_roles(&options.roles()).await.map_err(to_err)?;
        Ok(())
    }

    async fn configure_container(
        &self,
        state: &mut ConvergenceState,
        cycle: &mut Cycle,
    ) -> Result<(), ReconcileError> {
        let built = match self
            .builder
            .build(&state.effective_options(), state.tracker.current())
        {
            Ok(built) => built,
            Err(e) => {
                warn!(error = %e, "cannot build workload spec");
                cycle.status.raise(UnitStatus::blocked(e.to_string()));
                return Ok(());
            }
        };

        let digest = built.spec.digest();
        if state.last_applied.as_deref() == Some(digest.as_str()) {
            info!(%digest, "no changes to workload spec");
        } else {
            cycle.status.raise(UnitStatus::maintenance(messages::CONFIGURING));
            self.ctx
                .applier
                .apply_spec(&built.spec)
                .await
                .map_err(|source| ReconcileError::Apply { source })?;
            state.last_applied = Some(digest);
            cycle.applied = true;
        }
        state.set(Flag::SpecApplied);
        Ok(())
    }
}

fn log_connection(current: Option<&ConnectionState>) {
    match current {
        Some(connection) => debug!(%connection, "database connection"),
        None => debug!("database connected, master not yet available"),
    }
}
