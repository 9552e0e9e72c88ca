//! generik8s - runs one containerized workload against its options and an
//! optional PostgreSQL dependency

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Api;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use generik8s_common::kube_utils::create_client;
use generik8s_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use generik8s_operator::cluster::KubeWorkloadApplier;
use generik8s_operator::database::KubeDatabaseRequests;
use generik8s_operator::runner::Runner;
use generik8s_operator::store::{KubeStateStore, KubeStatusReporter};
use generik8s_operator::watch::{self, Source};
use generik8s_operator::{Context, ConvergenceEngine};
use generik8s_workload::{
    database_required, ConnectionState, ControllerOptions, MasterRecord, SpecBuilder,
};

/// Capacity of the controller input queue
const QUEUE_CAPACITY: usize = 64;

/// generik8s - keep one containerized workload converged
#[derive(Parser, Debug)]
#[command(name = "generik8s", version, about, long_about = None)]
struct Cli {
    /// Path to kubeconfig (in-cluster config when unset)
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Log output format (text or json)
    #[arg(long, env = "GENERIK8S_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller
    Controller(ControllerArgs),
    /// Build the workload spec offline and print it without secrets
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ControllerArgs {
    /// Application name, also the container and Deployment name
    #[arg(long, env = "GENERIK8S_APP")]
    app: String,

    /// Namespace of the workload and every object the controller reads or writes
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    namespace: String,

    /// ConfigMap holding the options [default: <app>-options]
    #[arg(long)]
    options_configmap: Option<String>,

    /// Secret holding `container_secrets` [default: <app>-secrets]
    #[arg(long)]
    secrets_secret: Option<String>,

    /// Secret published by the database [default: <app>-postgres]
    #[arg(long)]
    database_secret: Option<String>,

    /// Secret holding the convergence state [default: <app>-state]
    #[arg(long)]
    state_secret: Option<String>,

    /// ConfigMap the status is written to [default: <app>-status]
    #[arg(long)]
    status_configmap: Option<String>,

    /// ConfigMap the database request is published to [default: <app>-database-request]
    #[arg(long)]
    database_request_configmap: Option<String>,
}

impl ControllerArgs {
    fn name_or_default(&self, name: Option<&str>, suffix: &str) -> String {
        name.map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", self.app, suffix))
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Application name
    #[arg(long, env = "GENERIK8S_APP")]
    app: String,

    /// YAML file with the options
    #[arg(long)]
    options: PathBuf,

    /// YAML file with a database master record (host, dbname, port, user, password, uri)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        filter: None,
    })?;

    match cli.command {
        Commands::Controller(args) => run_controller(cli.kubeconfig.as_deref(), args).await,
        Commands::Render(args) => render(args),
    }
}

async fn run_controller(kubeconfig: Option<&Path>, args: ControllerArgs) -> anyhow::Result<()> {
    let client = create_client(kubeconfig).await?;
    let ns = args.namespace.clone();
    let app = args.app.clone();

    let ctx = Context::new(
        app.clone(),
        Arc::new(KubeWorkloadApplier::new(client.clone(), ns.clone())),
        Arc::new(KubeDatabaseRequests::new(
            client.clone(),
            ns.clone(),
            args.name_or_default(args.database_request_configmap.as_deref(), "database-request"),
            app.clone(),
        )),
        Arc::new(KubeStateStore::new(
            client.clone(),
            ns.clone(),
            args.name_or_default(args.state_secret.as_deref(), "state"),
            app.clone(),
        )),
        Arc::new(KubeStatusReporter::new(
            client.clone(),
            ns.clone(),
            args.name_or_default(args.status_configmap.as_deref(), "status"),
            app.clone(),
        )),
    );
    let engine = ConvergenceEngine::load(ctx).await?;

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let watchers = vec![
        watch::spawn_watch(
            Api::<ConfigMap>::namespaced(client.clone(), &ns),
            args.name_or_default(args.options_configmap.as_deref(), "options"),
            Source::Options,
            tx.clone(),
            watch::options_applied,
            watch::options_deleted,
        ),
        watch::spawn_watch(
            Api::<Secret>::namespaced(client.clone(), &ns),
            args.name_or_default(args.secrets_secret.as_deref(), "secrets"),
            Source::Secrets,
            tx.clone(),
            watch::secrets_applied,
            watch::secrets_deleted,
        ),
        watch::spawn_watch(
            Api::<Secret>::namespaced(client, &ns),
            args.name_or_default(args.database_secret.as_deref(), "postgres"),
            Source::Database,
            tx,
            watch::database_applied,
            watch::database_deleted,
        ),
    ];

    info!(%app, namespace = %ns, "controller started");
    let result = tokio::select! {
        result = Runner::new(engine, rx).run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    for handle in watchers {
        handle.abort();
    }
    if let Err(e) = &result {
        error!(
            error = %e,
            stage = e.stage(),
            retryable = e.inner().is_retryable(),
            "controller stopped"
        );
    }
    Ok(result?)
}

fn render(args: RenderArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.options)
        .with_context(|| format!("failed to read {}", args.options.display()))?;
    let options: ControllerOptions = serde_yaml::from_str(&text)
        .with_context(|| format!("{} is not a valid options document", args.options.display()))?;

    let state = match &args.database {
        Some(path) => {
            let record = read_master_record(path)?;
            let state = ConnectionState::from_record(&record);
            if state.is_none() {
                warn!("database record is incomplete, placeholders render empty");
            }
            state
        }
        None => None,
    };

    info!(
        database_required = database_required(&options),
        "dependency gate"
    );

    let built = SpecBuilder::new(args.app)
        .build(&options, state.as_ref())
        .map_err(generik8s_common::Error::from)?;
    print!("{}", serde_yaml::to_string(&built.sanitized)?);
    Ok(())
}

fn read_master_record(path: &Path) -> anyhow::Result<MasterRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&text)
        .with_context(|| format!("{} is not a YAML mapping", path.display()))?;
    let data = raw
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_yaml::Value::String(s) => Some((k, s)),
            serde_yaml::Value::Number(n) => Some((k, n.to_string())),
            _ => None,
        })
        .collect();
    Ok(MasterRecord::from_data(&data))
}
