mod config;
mod history_cmd;
mod plan_file;
mod run_cmd;
mod updater;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::MaestroConfig;

#[derive(Parser)]
#[command(name = "maestro", about = "Plan-driven orchestrator for fleets of LLM coding agents")]
struct Cli {
    /// Path to the learning store database (overrides MAESTRO_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Agent CLI binary (overrides MAESTRO_AGENT_BINARY)
    #[arg(long, global = true)]
    agent_binary: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a maestro config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Execute one or more plan files
    Run {
        /// Plan files to execute (merged when more than one)
        plans: Vec<PathBuf>,
        /// Session tag reused across persisted records
        #[arg(long)]
        session_id: Option<String>,
        /// Run number override (derived from the store when omitted)
        #[arg(long)]
        run_number: Option<u32>,
        /// Re-run tasks a prior run already completed
        #[arg(long)]
        rerun_completed: bool,
        /// Skip the protected-branch guard
        #[arg(long)]
        no_branch_guard: bool,
        /// Refuse to run with uncommitted changes
        #[arg(long)]
        require_clean: bool,
        /// Print the merged plan and exit without executing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the execution history for a task
    History {
        /// Plan file the task belongs to
        plan: String,
        /// Task number
        task: String,
    },
    /// Show the failure analysis for a task
    Analyze {
        /// Plan file the task belongs to
        plan: String,
        /// Task number
        task: String,
        /// Attempts required before a swap is recommended
        #[arg(long, default_value_t = 2)]
        min_attempts: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maestro=info")),
        )
        .init();

    let cli = Cli::parse();
    let resolved = MaestroConfig::resolve(cli.db, cli.agent_binary)?;

    match cli.command {
        Commands::Init { force } => init(force),
        Commands::Run {
            plans,
            session_id,
            run_number,
            rerun_completed,
            no_branch_guard,
            require_clean,
            dry_run,
        } => {
            run_cmd::run(
                run_cmd::RunArgs {
                    plans,
                    session_id,
                    run_number,
                    rerun_completed,
                    no_branch_guard,
                    require_clean,
                    dry_run,
                },
                resolved,
            )
            .await
        }
        Commands::History { plan, task } => history_cmd::history(resolved, plan, task).await,
        Commands::Analyze {
            plan,
            task,
            min_attempts,
        } => history_cmd::analyze(resolved, plan, task, min_attempts).await,
    }
}

fn init(force: bool) -> Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let file = config::ConfigFile {
        store: config::StoreSection {
            path: Some(config::config_dir().join("learning.db")),
        },
        agents: config::AgentSection {
            binary: Some("claude".to_owned()),
            installed: vec![
                "quality-control".to_owned(),
                "general-purpose".to_owned(),
                "rust-pro".to_owned(),
            ],
        },
    };
    config::save_config(&file)?;
    println!("wrote {}", path.display());
    Ok(())
}
