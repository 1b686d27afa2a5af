//! `maestro run`: load plans, assemble the execution stack, and drive the
//! orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use maestro_core::Orchestrator;
use maestro_core::branch_guard::{BranchGuard, BranchGuardHook};
use maestro_core::checkpoint::GitCheckpointer;
use maestro_core::config::{BranchGuardConfig, ExecutionConfig};
use maestro_core::executor::{TaskExecutor, WaveExecutor};
use maestro_core::failure::AgentSwapper;
use maestro_core::invoke::{ProcessInvoker, StaticAgentRegistry};
use maestro_core::logging::TracingLogger;
use maestro_core::model::Plan;
use maestro_core::qc::QualityController;
use maestro_core::review::AgentReviewer;
use maestro_core::rollback::RollbackManager;
use maestro_store::{SqliteLearningStore, pool};

use crate::config::MaestroConfig;
use crate::plan_file;
use crate::updater::TomlPlanUpdater;

/// Flags for `maestro run`.
pub struct RunArgs {
    pub plans: Vec<PathBuf>,
    pub session_id: Option<String>,
    pub run_number: Option<u32>,
    pub rerun_completed: bool,
    pub no_branch_guard: bool,
    pub require_clean: bool,
    pub dry_run: bool,
}

pub async fn run(args: RunArgs, config: MaestroConfig) -> Result<()> {
    if args.plans.is_empty() {
        bail!("at least one plan file is required");
    }

    // Load every plan fragment; missing files fail here, before any setup.
    let mut plans: Vec<Plan> = Vec::with_capacity(args.plans.len());
    let mut rollback_config = None;
    for path in &args.plans {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file {}", path.display()))?;
        let plan = plan_file::parse_plan_toml(&contents, path)
            .with_context(|| format!("invalid plan file {}", path.display()))?;
        if rollback_config.is_none() {
            rollback_config = plan_file::parse_rollback_config(&contents)?;
        }
        plans.push(plan);
    }

    let quality_control = plans
        .iter()
        .find_map(|p| p.quality_control.clone())
        .unwrap_or_default();

    let exec_config = ExecutionConfig {
        session_id: args.session_id,
        run_number: args.run_number,
        rerun_completed: args.rerun_completed,
        quality_control,
        rollback: rollback_config.unwrap_or_default(),
        ..Default::default()
    };

    if args.dry_run {
        return print_dry_run(&plans, &exec_config);
    }

    // Learning store.
    let store_pool = pool::create_pool(&config.store_path).await?;
    pool::run_migrations(&store_pool, pool::default_migrations_path()).await?;
    let store: Arc<SqliteLearningStore> = Arc::new(SqliteLearningStore::new(store_pool));

    // Agent transport and review stack.
    let invoker = Arc::new(ProcessInvoker::with_binary(config.agent_binary.clone()));
    let registry: Option<Arc<StaticAgentRegistry>> = if config.installed_agents.is_empty() {
        None
    } else {
        Some(Arc::new(
            config.installed_agents.iter().cloned().collect(),
        ))
    };
    let reviewer = Arc::new(AgentReviewer::new(invoker.clone() as _));
    let qc = QualityController::new(
        reviewer,
        registry
            .clone()
            .map(|r| r as Arc<dyn maestro_core::invoke::AgentRegistry>),
    );

    // Git-backed checkpointing in the current repository.
    let repo_root = std::env::current_dir().context("failed to resolve working directory")?;
    let checkpointer = Arc::new(GitCheckpointer::new(&repo_root));

    let rollback = RollbackManager::new(
        exec_config.rollback.clone(),
        Some(checkpointer.clone() as _),
    );

    let plan_basename = plans[0].basename();
    let updater = Arc::new(TomlPlanUpdater::new(plans[0].file_path.clone()));
    let logger = Arc::new(TracingLogger);

    let swap_candidates: Vec<String> = registry
        .as_ref()
        .map(|r| {
            use maestro_core::invoke::AgentRegistry;
            r.list()
        })
        .unwrap_or_default();

    let mut task_executor = TaskExecutor::new(invoker.clone() as _, exec_config.clone())
        .with_quality_controller(qc)
        .with_rollback(rollback, checkpointer.clone() as _)
        .with_store(store.clone() as _)
        .with_updater(updater as _)
        .with_logger(logger.clone() as _)
        .with_swapper(AgentSwapper::new(swap_candidates));
    if let Some(default_agent) = plans.iter().find_map(|p| p.default_agent.clone()) {
        task_executor = task_executor.with_default_agent(default_agent);
    }

    let wave_executor = Arc::new(
        WaveExecutor::new(Arc::new(task_executor), exec_config.clone())
            .with_logger(logger.clone() as _),
    );

    let branch_guard = if args.no_branch_guard {
        BranchGuardHook::default()
    } else {
        let guard_config = BranchGuardConfig {
            require_clean_state: args.require_clean,
            ..Default::default()
        };
        BranchGuardHook::new(Some(BranchGuard::new(
            checkpointer as _,
            guard_config,
            plan_basename,
        )))
    };

    let orchestrator = Orchestrator::new(wave_executor, exec_config)
        .with_branch_guard(branch_guard)
        .with_store(store as _)
        .with_logger(logger as _)
        .with_signal_handling();

    match orchestrator.execute(plans, CancellationToken::new()).await {
        Ok(result) => {
            print_summary(&result);
            if result.failed > 0 {
                bail!("{} task(s) failed", result.failed);
            }
            Ok(())
        }
        Err(failure) => {
            print_summary(&failure.result);
            Err(failure.source.context("run aborted"))
        }
    }
}

fn print_dry_run(plans: &[Plan], config: &ExecutionConfig) -> Result<()> {
    let merged = maestro_core::plan::merge_plans(plans.to_vec())?;
    println!("plan: {} task(s), {} wave(s)", merged.tasks.len(), merged.waves.len());
    for wave in &merged.waves {
        let concurrency = if wave.max_concurrency == 0 {
            "all".to_owned()
        } else {
            wave.max_concurrency.to_string()
        };
        println!("  wave {} (concurrency {concurrency}):", wave.name);
        for number in &wave.task_numbers {
            let task = &merged.tasks[number];
            let agent = task
                .agent
                .as_deref()
                .or(merged.default_agent.as_deref())
                .unwrap_or("general-purpose");
            println!("    [{number}] {} -> {agent}", task.name);
        }
    }
    println!(
        "quality control: {}; skip completed: {}",
        if config.quality_control.enabled { "on" } else { "off" },
        config.skip_completed()
    );
    Ok(())
}

fn print_summary(result: &maestro_core::model::ExecutionResult) {
    println!(
        "\nsession {}: {}/{} completed, {} failed in {:.1}s",
        result.session_id,
        result.completed,
        result.total_tasks,
        result.failed,
        result.duration.as_secs_f64()
    );
    for task in &result.failed_tasks {
        println!("  failed: task {task}");
    }
}
