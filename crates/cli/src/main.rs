//! opsloop CLI — the main entry point.
//!
//! Commands:
//! - `init`   — Write the default configuration document
//! - `run`    — Execute a single request through the agent loop
//! - `chat`   — Interactive terminal loop
//! - `config` — Print the effective configuration

use clap::{Parser, Subcommand};
use opsloop_agent::AgentLoop;
use opsloop_config::AppConfig;
use opsloop_memory::MemoryStore;
use opsloop_provider::ChatClient;
use opsloop_security::{AuditLog, Constraints};
use opsloop_tools::ToolRunner;
use std::path::PathBuf;
use std::sync::Arc;

mod repl;

#[derive(Parser)]
#[command(
    name = "opsloop",
    about = "opsloop — a sandboxed tool-using agent for OpenAI-compatible endpoints",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration document
    #[arg(short, long, global = true, default_value = "opsloop.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration document
    Init,

    /// Execute a single request
    Run {
        /// The request to execute
        request: String,
    },

    /// Interactive terminal loop
    Chat,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Init => {
            if cli.config.exists() {
                println!("Config already exists at {}", cli.config.display());
            } else {
                std::fs::write(&cli.config, AppConfig::default_json())?;
                println!("Wrote default config to {}", cli.config.display());
            }
        }
        Commands::Run { request } => {
            let session = Session::build(&config)?;
            let report = session.agent.run(&request).await?;
            println!("{}", report.response);
            if config.debug.enabled {
                println!("\n---\n{}", report.render_summary(config.agent.max_loops));
            }
        }
        Commands::Chat => {
            let session = Session::build(&config)?;
            repl::run(session, &config).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let filter = if verbose || (config.debug.enabled && config.debug.level == "verbose") {
        "debug"
    } else if config.debug.enabled {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

/// The assembled agent with the shared stores it runs against.
pub(crate) struct Session {
    pub agent: AgentLoop,
    pub audit: Arc<AuditLog>,
}

impl Session {
    fn build(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let constraints = Arc::new(Constraints::new(
            &config.workspace.dir,
            config.security.allowed_commands.clone(),
            config.security.timeout_sec,
            config.security.max_output_size,
            config.security.exec_enabled,
        )?);
        let audit = Arc::new(AuditLog::open(&config.audit.log_path)?);
        let memory = Arc::new(MemoryStore::load(&config.memory.path));
        let runner = ToolRunner::new(constraints, Arc::clone(&audit));
        let provider = Arc::new(ChatClient::new(
            config.vllm.base_url.clone(),
            config.vllm.model.clone(),
            config.vllm.api_key.clone(),
            config.vllm.temperature,
            config.vllm.max_tokens,
        ));

        let agent = AgentLoop::new(
            provider,
            runner,
            memory,
            Arc::clone(&audit),
            config.vllm.enable_function_calling,
            config.agent.max_loops,
            config.agent.loop_wait_sec,
        );

        Ok(Self { agent, audit })
    }
}
