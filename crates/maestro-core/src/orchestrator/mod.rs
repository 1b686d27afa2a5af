//! Orchestrator: merges plans, runs the once-per-run hooks, iterates
//! waves, and aggregates everything into an [`ExecutionResult`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::branch_guard::BranchGuardHook;
use crate::config::ExecutionConfig;
use crate::executor::{RunContext, WaveExecutor, WaveFailure};
use crate::hooks::SetupHook;
use crate::logging::ExecutionLogger;
use crate::model::{ExecutionResult, Plan, TaskResult};
use crate::plan::merge_plans;
use crate::store::LearningStore;

/// A failed run together with everything that completed before the
/// failure. Task-level failures alone do not produce this; wave-level
/// errors and cancellation do.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub result: ExecutionResult,
    pub source: anyhow::Error,
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for ExecutionFailure {}

/// Top-level execution driver for one run.
pub struct Orchestrator {
    wave_executor: Arc<WaveExecutor>,
    config: ExecutionConfig,
    branch_guard: BranchGuardHook,
    setup: Option<Arc<dyn SetupHook>>,
    store: Option<Arc<dyn LearningStore>>,
    logger: Option<Arc<dyn ExecutionLogger>>,
    handle_signals: bool,
}

impl Orchestrator {
    pub fn new(wave_executor: Arc<WaveExecutor>, config: ExecutionConfig) -> Self {
        Self {
            wave_executor,
            config,
            branch_guard: BranchGuardHook::default(),
            setup: None,
            store: None,
            logger: None,
            handle_signals: false,
        }
    }

    pub fn with_branch_guard(mut self, hook: BranchGuardHook) -> Self {
        self.branch_guard = hook;
        self
    }

    pub fn with_setup_hook(mut self, hook: Arc<dyn SetupHook>) -> Self {
        self.setup = Some(hook);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Cancel the run on SIGINT/SIGTERM.
    pub fn with_signal_handling(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    /// Execute `plans` (merged if more than one) under `cancel`.
    pub async fn execute(
        &self,
        plans: Vec<Plan>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let started = Instant::now();
        let session_id = self.session_id();

        let plan = match merge_plans(plans) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(&session_id, started, Vec::new(), 0, e.into())),
        };
        let total_tasks = plan.tasks.len();

        // Child scope: signals cancel it without touching the caller's token.
        let run_cancel = cancel.child_token();
        let signal_watcher = if self.handle_signals {
            let token = run_cancel.clone();
            Some(tokio::spawn(async move {
                wait_for_interrupt().await;
                info!("interrupt received, cancelling run");
                token.cancel();
            }))
        } else {
            None
        };

        let run_number = self.run_number(&plan).await;
        let ctx = RunContext {
            session_id: session_id.clone(),
            run_number,
            plan_file: plan.file_path.clone(),
        };

        info!(session = %session_id, run = run_number, tasks = total_tasks, "starting run");

        // Branch guard is a hard gate and must finish before setup runs.
        if let Err(e) = self.branch_guard.run().await {
            abort_watcher(signal_watcher);
            return Err(self.fail(&session_id, started, Vec::new(), total_tasks, e));
        }
        if let Some(setup) = &self.setup
            && let Err(e) = setup.run().await
        {
            warn!(error = %e, "setup hook failed, continuing");
        }

        let outcome = self
            .wave_executor
            .execute_plan(&plan, &ctx, &run_cancel)
            .await;

        abort_watcher(signal_watcher);

        match outcome {
            Ok(results) => {
                let result = aggregate(&session_id, started, results, total_tasks);
                if let Some(logger) = &self.logger {
                    logger.summary(&result);
                }
                Ok(result)
            }
            Err(WaveFailure { results, source }) => {
                Err(self.fail(&session_id, started, results, total_tasks, source))
            }
        }
    }

    fn fail(
        &self,
        session_id: &str,
        started: Instant,
        results: Vec<TaskResult>,
        total_tasks: usize,
        source: anyhow::Error,
    ) -> ExecutionFailure {
        let result = aggregate(session_id, started, results, total_tasks);
        if let Some(logger) = &self.logger {
            logger.summary(&result);
        }
        ExecutionFailure { result, source }
    }

    fn session_id(&self) -> String {
        match &self.config.session_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("session-{}", Local::now().format("%Y%m%d-%H%M")),
        }
    }

    async fn run_number(&self, plan: &Plan) -> u32 {
        if let Some(n) = self.config.run_number
            && n > 0
        {
            return n;
        }

        let (Some(store), Some(path)) = (&self.store, &plan.file_path) else {
            return 0;
        };
        match store.run_count(&path.to_string_lossy()).await {
            Ok(count) => count + 1,
            Err(e) => {
                warn!(error = %e, "run count unavailable, using 0");
                0
            }
        }
    }
}

/// Fold task results into the run-level summary.
fn aggregate(
    session_id: &str,
    started: Instant,
    results: Vec<TaskResult>,
    total_tasks: usize,
) -> ExecutionResult {
    let completed = results.iter().filter(|r| r.is_completed()).count();
    let failed = results.iter().filter(|r| r.is_failed()).count();
    let failed_tasks = results
        .iter()
        .filter(|r| r.is_failed())
        .map(|r| r.task_number.clone())
        .collect();

    ExecutionResult {
        total_tasks,
        completed,
        failed,
        duration: started.elapsed(),
        failed_tasks,
        session_id: session_id.to_owned(),
        task_results: results,
    }
}

fn abort_watcher(watcher: Option<tokio::task::JoinHandle<()>>) {
    if let Some(handle) = watcher {
        handle.abort();
    }
}

/// Resolve on SIGINT or SIGTERM (ctrl-c only on non-unix platforms).
async fn wait_for_interrupt() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
