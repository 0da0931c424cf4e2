use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docusign_connector::{
    AuthContext, ConnectorConfig, HostLogger, HostSink, HttpClient, Orchestrator, Row, SyncState,
    schema,
};
use tracing_subscriber::EnvFilter;

const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "docusign-connector",
    version,
    about = "Incremental eSignature envelope connector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the ten declared output tables and their primary-key columns.
    Schema,

    /// Run one sync, printing upserts and persisting the checkpoint to `--state`.
    Run {
        /// Path to a JSON file matching the host configuration surface.
        #[arg(long)]
        config: PathBuf,

        /// Path to a JSON state file; created with seed watermarks if absent.
        #[arg(long)]
        state: PathBuf,

        /// Directory the private-key path (if relative) is resolved against.
        #[arg(long, default_value = ".")]
        install_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("docusign_connector=debug")
    } else {
        EnvFilter::new("docusign_connector=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Schema => cmd_schema(),
        Commands::Run {
            config,
            state,
            install_dir,
        } => cmd_run(config, state, install_dir).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn cmd_schema() -> Result<()> {
    for table in schema() {
        println!("{}\t{}", table.table, table.primary_key.join(","));
    }
    Ok(())
}

async fn cmd_run(config_path: PathBuf, state_path: PathBuf, install_dir: PathBuf) -> Result<()> {
    let config_text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config file {}", config_path.display()))?;
    let mut config: ConnectorConfig = serde_json::from_str(&config_text)
        .with_context(|| format!("parsing config file {}", config_path.display()))?;
    config.validate().context("validating configuration")?;

    let state = if state_path.exists() {
        let text = std::fs::read_to_string(&state_path)
            .with_context(|| format!("reading state file {}", state_path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing state file {}", state_path.display()))?
    } else {
        SyncState::default()
    };

    let private_key = config
        .load_private_key(&install_dir)
        .context("loading private key")?;
    let http = reqwest::Client::new();
    let auth = AuthContext::new(config, private_key, http.clone());
    let client = HttpClient::new(http, auth.clone());
    let orchestrator = Orchestrator::new(client, auth);

    let sink = LocalHost::new(state_path);
    let logger = ConsoleLogger;

    orchestrator
        .run(&state, &sink, &logger)
        .await
        .context("running sync")?;
    sink.persist()?;
    Ok(())
}

/// A [`HostSink`] that prints every upsert and persists the checkpoint as a
/// JSON file — the CLI's in-process analogue of a real ingestion platform.
struct LocalHost {
    state_path: PathBuf,
    pending_checkpoint: Mutex<Option<SyncState>>,
}

impl LocalHost {
    fn new(state_path: PathBuf) -> Self {
        Self {
            state_path,
            pending_checkpoint: Mutex::new(None),
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(state) = self.pending_checkpoint.lock().unwrap().clone() else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&state)?;
        std::fs::write(&self.state_path, text)
            .with_context(|| format!("writing state file {}", self.state_path.display()))?;
        Ok(())
    }
}

impl HostSink for LocalHost {
    fn upsert(&self, table: &str, row: Row) {
        let fields: Vec<String> = row.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("{table}\t{}", fields.join("\t"));
    }

    fn checkpoint(&self, state: &SyncState) {
        *self.pending_checkpoint.lock().unwrap() = Some(state.clone());
    }
}

struct ConsoleLogger;

impl HostLogger for ConsoleLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn severe(&self, message: &str) {
        tracing::error!("{message}");
    }
}
