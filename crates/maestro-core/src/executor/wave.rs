//! Wave executor: bounded-parallel dispatch of each wave's tasks.
//!
//! Waves run strictly in order. Within a wave, workers are limited by a
//! semaphore sized to the wave's effective concurrency, serialized per
//! package by the [`PackageGuard`], and collected through an mpsc
//! channel. Results are reported in the wave's declared task order
//! regardless of completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BudgetCheckInterval, ExecutionConfig};
use crate::error::OrchestratorError;
use crate::executor::{AnomalyMonitor, RunContext, TaskExecutor};
use crate::hooks::{BudgetTracker, GuardProtocol};
use crate::logging::ExecutionLogger;
use crate::model::{Plan, Task, TaskResult, Wave};
use crate::package_guard::PackageGuard;

/// A wave-level error together with every result produced before it.
#[derive(Debug)]
pub struct WaveFailure {
    pub results: Vec<TaskResult>,
    pub source: anyhow::Error,
}

impl std::fmt::Display for WaveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for WaveFailure {}

/// Drives a plan wave by wave.
pub struct WaveExecutor {
    task_executor: Arc<TaskExecutor>,
    package_guard: Arc<PackageGuard>,
    config: ExecutionConfig,
    guard_protocol: Option<Arc<dyn GuardProtocol>>,
    budget: Option<Arc<BudgetTracker>>,
    logger: Option<Arc<dyn ExecutionLogger>>,
}

impl WaveExecutor {
    pub fn new(task_executor: Arc<TaskExecutor>, config: ExecutionConfig) -> Self {
        Self {
            task_executor,
            package_guard: Arc::new(PackageGuard::new()),
            config,
            guard_protocol: None,
            budget: None,
            logger: None,
        }
    }

    pub fn with_guard_protocol(mut self, protocol: Arc<dyn GuardProtocol>) -> Self {
        self.guard_protocol = Some(protocol);
        self
    }

    pub fn with_budget(mut self, tracker: Arc<BudgetTracker>) -> Self {
        self.budget = Some(tracker);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Execute every wave of `plan` in order.
    ///
    /// The first wave-level error stops the run; task-level failures are
    /// recorded on their results and do not.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskResult>, WaveFailure> {
        let mut all_results: Vec<TaskResult> = Vec::new();

        for wave in &plan.waves {
            match self.execute_wave(plan, wave, ctx, cancel).await {
                Ok(results) => all_results.extend(results),
                Err(WaveFailure { results, source }) => {
                    all_results.extend(results);
                    return Err(WaveFailure {
                        results: all_results,
                        source,
                    });
                }
            }
        }

        Ok(all_results)
    }

    async fn execute_wave(
        &self,
        plan: &Plan,
        wave: &Wave,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskResult>, WaveFailure> {
        let started = Instant::now();

        // -- Partition: skip what a prior run already finished ------------
        let mut settled: HashMap<String, TaskResult> = HashMap::new();
        let mut to_execute: Vec<Task> = Vec::new();

        for number in &wave.task_numbers {
            let Some(task) = plan.task(number) else {
                return Err(WaveFailure {
                    results: Vec::new(),
                    source: OrchestratorError::UnknownWaveTask {
                        wave: wave.name.clone(),
                        task: number.clone(),
                    }
                    .into(),
                });
            };

            if self.config.skip_completed() && task.is_already_completed() {
                info!(task = %task.number, "skipping previously completed task");
                settled.insert(number.clone(), TaskResult::skipped(task));
            } else {
                to_execute.push(task.clone());
            }
        }

        if to_execute.is_empty() {
            return Ok(assemble(wave, settled, HashMap::new()));
        }

        // -- Wave gates ----------------------------------------------------
        self.apply_guard_protocol(wave, &mut to_execute, &mut settled).await;

        if let Some(budget) = &self.budget
            && budget.check_interval() == BudgetCheckInterval::PerWave
            && let Err(e) = budget.check(self.logger.as_deref())
        {
            return Err(WaveFailure {
                results: assemble(wave, settled, HashMap::new()),
                source: e.into(),
            });
        }

        if to_execute.is_empty() {
            return Ok(assemble(wave, settled, HashMap::new()));
        }

        // -- Dispatch ------------------------------------------------------
        let concurrency = effective_concurrency(wave.max_concurrency, to_execute.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<TaskResult>(to_execute.len());

        let mut wave_started = false;
        let mut launch_error: Option<anyhow::Error> = None;

        for task in to_execute {
            if cancel.is_cancelled() {
                launch_error = Some(anyhow!("context canceled"));
                break;
            }

            if let Some(budget) = &self.budget
                && budget.check_interval() == BudgetCheckInterval::PerTask
                && let Err(e) = budget.check(self.logger.as_deref())
            {
                launch_error = Some(e.into());
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        Err(e) => {
                            launch_error = Some(anyhow::Error::new(e).context("wave semaphore closed"));
                            break;
                        }
                    }
                }
                () = cancel.cancelled() => {
                    launch_error = Some(anyhow!("context canceled"));
                    break;
                }
            };

            if !wave_started {
                if let Some(logger) = &self.logger {
                    logger.wave_start(wave, wave.task_numbers.len());
                }
                wave_started = true;
            }

            let executor = Arc::clone(&self.task_executor);
            let packages = Arc::clone(&self.package_guard);
            let worker_tx = tx.clone();
            let worker_cancel = cancel.clone();
            let worker_ctx = ctx.clone();

            tokio::spawn(async move {
                let result = run_worker(executor, packages, task, worker_ctx, worker_cancel).await;
                drop(permit);
                let _ = worker_tx.send(result).await;
            });
        }
        drop(tx);

        // -- Collection ----------------------------------------------------
        let mut executed: HashMap<String, TaskResult> = HashMap::new();
        let mut anomaly = AnomalyMonitor::new(self.config.anomaly_threshold);

        while let Some(result) = rx.recv().await {
            if let Some(logger) = &self.logger {
                if let Err(e) = logger.task_result(&result) {
                    warn!(task = %result.task_number, error = %e, "task result log failed");
                }
                if let Some(streak) = anomaly.observe(&result) {
                    logger.anomaly(&wave.name, streak);
                }
            } else if let Some(streak) = anomaly.observe(&result) {
                warn!(wave = %wave.name, streak, "consecutive task failures");
            }

            executed.insert(result.task_number.clone(), result);

            if let Some(logger) = &self.logger {
                let so_far: Vec<TaskResult> = wave
                    .task_numbers
                    .iter()
                    .filter_map(|n| settled.get(n).or_else(|| executed.get(n)).cloned())
                    .collect();
                logger.progress(&so_far);
            }
        }

        // -- Assembly ------------------------------------------------------
        let ordered = assemble(wave, settled, executed);

        if wave_started && let Some(logger) = &self.logger {
            logger.wave_complete(wave, started.elapsed(), &ordered);
        }

        if cancel.is_cancelled() {
            return Err(WaveFailure {
                results: ordered,
                source: anyhow!("context canceled"),
            });
        }
        if let Some(source) = launch_error {
            return Err(WaveFailure {
                results: ordered,
                source,
            });
        }

        Ok(ordered)
    }

    /// Run the pre-wave guard protocol: block flagged tasks and apply
    /// agent substitutions in place. Protocol errors degrade to a warning.
    async fn apply_guard_protocol(
        &self,
        wave: &Wave,
        to_execute: &mut Vec<Task>,
        settled: &mut HashMap<String, TaskResult>,
    ) {
        let Some(protocol) = &self.guard_protocol else {
            return;
        };

        let decisions = match protocol.assess_wave(to_execute).await {
            Ok(decisions) => decisions,
            Err(e) => {
                warn!(wave = %wave.name, error = %e, "guard protocol failed, wave unfiltered");
                return;
            }
        };

        for decision in decisions {
            let Some(position) = to_execute.iter().position(|t| t.number == decision.task_number)
            else {
                continue;
            };

            if decision.should_block {
                let task = to_execute.remove(position);
                if let Some(logger) = &self.logger {
                    logger.guard_prediction(&task.number, &decision.reason, &decision.risk_factors);
                }
                let mut result = TaskResult::failed(
                    &task,
                    format!("blocked by guard: {}", decision.reason),
                );
                if !decision.risk_factors.is_empty() {
                    result.review_feedback =
                        Some(format!("risk factors: {}", decision.risk_factors.join(", ")));
                }
                settled.insert(task.number.clone(), result);
            } else if let Some(suggested) = decision.suggested_agent {
                let task = &mut to_execute[position];
                let previous = task.agent.clone().unwrap_or_default();
                if let Some(logger) = &self.logger {
                    logger.agent_swap(&task.number, &previous, &suggested, "guard");
                }
                task.agent = Some(suggested);
            }
        }
    }
}

/// Clamp the wave's configured concurrency to `[1, task_count]`; zero
/// means "all tasks at once".
fn effective_concurrency(configured: usize, task_count: usize) -> usize {
    if configured == 0 || configured > task_count {
        task_count.max(1)
    } else {
        configured
    }
}

/// One worker: package locks, then the task executor.
async fn run_worker(
    executor: Arc<TaskExecutor>,
    packages: Arc<PackageGuard>,
    task: Task,
    ctx: RunContext,
    cancel: CancellationToken,
) -> TaskResult {
    let lease = match packages.acquire(&task.number, &task.packages, &cancel).await {
        Ok(lease) => lease,
        Err(e) => return TaskResult::failed(&task, format!("{e:#}")),
    };

    let result = match executor.execute(&task, &ctx, &cancel).await {
        Ok(result) => result,
        // An executor error without a result becomes a FAILED result.
        Err(e) => TaskResult::failed(&task, format!("{e:#}")),
    };

    drop(lease);
    result
}

/// Order the wave's results by its declared task numbers.
fn assemble(
    wave: &Wave,
    mut settled: HashMap<String, TaskResult>,
    mut executed: HashMap<String, TaskResult>,
) -> Vec<TaskResult> {
    wave.task_numbers
        .iter()
        .filter_map(|n| settled.remove(n).or_else(|| executed.remove(n)))
        .collect()
}
