//! Podvisor CLI - PID-1 entrypoint for agent pods

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use podvisor_core::config::{ConfigOverrides, SupervisorConfig};
use podvisor_supervisor::{run_pod, scan_transcripts, select_resume_transcript};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "podvisor")]
#[command(about = "Keeps an interactive coding agent alive inside its pod", long_about = None)]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value_t = LogFormat::Text,
        global = true,
        env = "PODVISOR_LOG_FORMAT"
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor until stopped or the agent crash-loops
    Run(RunArgs),
    /// Show which transcript the next session would resume
    Transcripts {
        /// Agent workspace
        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },
    /// Version information
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Agent workspace
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Consecutive short sessions tolerated before exiting
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Always start a fresh session
    #[arg(long)]
    no_resume: bool,

    /// Sidecar control port
    #[arg(long)]
    coop_port: Option<u16>,

    /// Sidecar health port
    #[arg(long)]
    health_port: Option<u16>,

    /// Agent command run inside the sidecar
    #[arg(long)]
    agent_command: Option<String>,
}

impl From<RunArgs> for ConfigOverrides {
    fn from(args: RunArgs) -> Self {
        ConfigOverrides {
            workspace: args.workspace,
            coop_port: args.coop_port,
            health_port: args.health_port,
            agent_command: args.agent_command,
            max_restarts: args.max_restarts,
            resume_enabled: args.no_resume.then_some(false),
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            println!("podvisor {}", env!("CARGO_PKG_VERSION"));
            println!("podvisor-core {}", podvisor_core::VERSION);
        }
        Commands::Transcripts { workspace } => {
            let overrides = ConfigOverrides {
                workspace,
                ..Default::default()
            };
            let config = SupervisorConfig::load_with(overrides).context("loading configuration")?;
            let state_dir = config.state_dir();
            let scan = scan_transcripts(&state_dir);

            println!("state dir:  {}", state_dir.display());
            println!("candidates: {}", scan.candidates.len());
            println!("stale:      {}", scan.stale_count);
            match select_resume_transcript(&state_dir, config.resume_enabled) {
                Some(path) => println!("resume:     {}", path.display()),
                None => println!("resume:     none"),
            }
        }
        Commands::Run(args) => {
            let config = SupervisorConfig::load_with(args.into()).context("loading configuration")?;
            run_pod(config).await?;
        }
    }

    Ok(())
}
