use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use cortex::capabilities::{CapabilityRegistry, JobStore};
use cortex::flow::{BroadcastReply, Executor, FlowNormalizer};
use cortex::{keys, AppConfig, CapabilityFactory, ConversationId, Event, Publish, SharedState};

#[derive(Parser)]
#[command(name = "cortex", version, about = "Plan, walk and stream capability task graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cortex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow document and print its events as JSON lines
    Run {
        /// File holding a complete graph or a flow shorthand
        flow: PathBuf,
        /// Goal bound to the reply shorthand and shown to planners
        #[arg(long, default_value = "")]
        goal: String,
        /// Project directory for file-writing capabilities
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// List the built-in capabilities
    Capabilities,
    /// Show the effective configuration
    Config,
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }
    AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    cortex::init_tracing(&config.log);

    let registry = Arc::new(CapabilityRegistry::with_builtins(Arc::new(JobStore::new())));

    match cli.command {
        Commands::Run {
            flow,
            goal,
            project,
        } => {
            let text = std::fs::read_to_string(&flow)
                .with_context(|| format!("reading {}", flow.display()))?;
            let raw: Value = serde_json::from_str(&text).context("flow is not valid JSON")?;
            let graph = FlowNormalizer::from_config(&config).normalize(&raw, &goal)?;

            let cid = ConversationId::new();
            let mut state = SharedState::for_conversation(&cid);
            state.set_goal(goal);
            state.set(keys::PLANNER, Value::String(config.executor.planner.clone()));
            if let Some(project) = project {
                state.set(
                    keys::PROJECT_ROOT,
                    Value::String(project.display().to_string()),
                );
            }

            let publisher: Arc<dyn Publish> =
                Arc::new(|event: Event| match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                });

            let mut executor = Executor::new(graph, registry, &mut state, publisher)
                .with_config(&config)
                .with_reply_policy(BroadcastReply);
            let outcome = executor.run().await?;
            info!(conversation = %cid, passes = outcome.passes(), "Flow finished");
        }
        Commands::Capabilities => {
            println!("{}", registry.describe(None));
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
