//! Controller runner
//!
//! Owns the engine and drains the input queue one item at a time, so cycles
//! never overlap. Options and secrets live in separate objects; the runner
//! assembles them into one options revision and holds the first revision
//! back until both have been listed, so the workload is never built from
//! the options without their secrets.

use std::collections::BTreeMap;

use generik8s_workload::ControllerOptions;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::ConvergenceEngine;
use crate::error::ReconcileError;
use crate::events::Event;
use crate::watch::{Input, Source};

/// Builds options revisions from the options and secrets inputs
#[derive(Debug, Default)]
pub struct OptionsAssembler {
    data: BTreeMap<String, String>,
    secrets: Option<String>,
    options_synced: bool,
    secrets_synced: bool,
}

impl OptionsAssembler {
    /// Empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Record options ConfigMap data
    pub fn set_options(&mut self, data: BTreeMap<String, String>) -> Option<ControllerOptions> {
        self.data = data;
        self.revision()
    }

    /// Record the secrets document
    pub fn set_secrets(&mut self, secrets: Option<String>) -> Option<ControllerOptions> {
        self.secrets = secrets;
        self.revision()
    }

    /// Record that a watcher finished listing
    pub fn synced(&mut self, source: Source) -> Option<ControllerOptions> {
        match source {
            Source::Options => self.options_synced = true,
            Source::Secrets => self.secrets_synced = true,
            Source::Database => return None,
        }
        self.revision()
    }

    fn revision(&self) -> Option<ControllerOptions> {
        if !(self.options_synced && self.secrets_synced) {
            return None;
        }
        Some(ControllerOptions::from_data(&self.data).with_container_secrets(self.secrets.clone()))
    }
}

/// Drives the engine from the input queue
pub struct Runner {
    engine: ConvergenceEngine,
    assembler: OptionsAssembler,
    rx: mpsc::Receiver<Input>,
}

impl Runner {
    /// Runner consuming `rx`
    pub fn new(engine: ConvergenceEngine, rx: mpsc::Receiver<Input>) -> Self {
        Self {
            engine,
            assembler: OptionsAssembler::new(),
            rx,
        }
    }

    /// Translate an input into an engine event, if it makes one
    fn event_for(&mut self, input: Input) -> Option<Event> {
        match input {
            Input::Options(data) => self.assembler.set_options(data).map(Event::OptionsChanged),
            Input::Secrets(secrets) => self
                .assembler
                .set_secrets(secrets)
                .map(Event::OptionsChanged),
            Input::Synced(source) => {
                debug!(?source, "watcher synced");
                self.assembler.synced(source).map(Event::OptionsChanged)
            }
            Input::Database(relation) => Some(Event::Relation(relation)),
        }
    }

    /// Run until the queue closes or a cycle fails.
    ///
    /// An upgrade cycle runs first when the saved state comes from another
    /// controller version.
    pub async fn run(mut self) -> Result<(), ReconcileError> {
        if self.engine.needs_upgrade() {
            info!("controller version changed, running upgrade");
            self.engine.handle(Event::Upgrade).await?;
        }

        while let Some(input) = self.rx.recv().await {
            if let Some(event) = self.event_for(input) {
                let outcome = self.engine.handle(event).await?;
                debug!(
                    handlers = ?outcome.ran.iter().map(|h| h.name()).collect::<Vec<_>>(),
                    applied = outcome.applied,
                    "cycle complete"
                );
            }
        }

        info!("input queue closed, runner stopping");
        Ok(())
    }

    /// The engine, for inspection
    pub fn engine(&self) -> &ConvergenceEngine {
        &self.engine
    }
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
    fn first_revision_waits_for_both_lists() {
        let mut asm = OptionsAssembler::new();
        assert_eq!(asm.set_options(data(&[("image", "x")])), None);
        assert_eq!(asm.synced(Source::Options), None);
        assert_eq!(asm.set_secrets(Some("TOKEN: t".to_string())), None);
        assert_eq!(asm.synced(Source::Database), None);

        let options = asm.synced(Source::Secrets).unwrap();
        assert_eq!(options.image, "x");
        assert_eq!(options.container_secrets, "TOKEN: t");
    }

    #[test]
    fn later_changes_emit_revisions() {
        let mut asm = OptionsAssembler::new();
        asm.synced(Source::Options);
        asm.synced(Source::Secrets);

        let options = asm.set_options(data(&[("image", "y")])).unwrap();
        assert_eq!(options.image, "y");
        assert_eq!(options.container_secrets, "{}");

        let options = asm.set_secrets(Some("A: b".to_string())).unwrap();
        assert_eq!(options.image, "y");
        assert_eq!(options.container_secrets, "A: b");
    }

    #[test]
    fn secrets_document_overrides_options_key() {
        let mut asm = OptionsAssembler::new();
        asm.synced(Source::Options);
        asm.synced(Source::Secrets);
        asm.set_options(data(&[("container_secrets", "FROM: configmap")]));

        let options = asm.set_secrets(None).unwrap();
        assert_eq!(options.container_secrets, "FROM: configmap");
        let options = asm.set_secrets(Some("FROM: secret".to_string())).unwrap();
        assert_eq!(options.container_secrets, "FROM: secret");
    }
}
