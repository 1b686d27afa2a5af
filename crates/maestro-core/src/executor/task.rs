//! Single-task executor: the per-task state machine.
//!
//! One call to [`TaskExecutor::execute`] runs a task from pre-hooks
//! through invocation, review, retries, optional rollback, and recording.
//! Every optional collaborator degrades gracefully; the returned
//! [`TaskResult`] is the sole account of what happened.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::Checkpointer;
use crate::config::ExecutionConfig;
use crate::executor::RunContext;
use crate::failure::{AgentSwapper, FailureAnalyzer};
use crate::hooks::{
    BudgetTracker, EstimationHook, PatternIntelligenceHook, PatternOutcome, WarmUpHook,
};
use crate::invoke::{InvokeOptions, Invoker};
use crate::logging::ExecutionLogger;
use crate::model::{AttemptRecord, CheckpointInfo, Task, TaskResult, Verdict};
use crate::plan::PlanUpdater;
use crate::qc::{QcOutcome, QualityController};
use crate::rollback::RollbackManager;
use crate::store::{LearningStore, TaskExecution};

/// Agent used when neither the task nor the plan names one.
pub const DEFAULT_AGENT: &str = "general-purpose";

/// Executes one task to completion.
pub struct TaskExecutor {
    invoker: Arc<dyn Invoker>,
    config: ExecutionConfig,
    default_agent: String,
    qc: Option<QualityController>,
    rollback: RollbackManager,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    store: Option<Arc<dyn LearningStore>>,
    updater: Option<Arc<dyn PlanUpdater>>,
    logger: Option<Arc<dyn ExecutionLogger>>,
    analyzer: FailureAnalyzer,
    swapper: Option<AgentSwapper>,
    warmup: Option<WarmUpHook>,
    pattern: Option<PatternIntelligenceHook>,
    estimation: Option<EstimationHook>,
    budget: Option<Arc<BudgetTracker>>,
    invoke_options: InvokeOptions,
}

impl TaskExecutor {
    pub fn new(invoker: Arc<dyn Invoker>, config: ExecutionConfig) -> Self {
        Self {
            invoker,
            config,
            default_agent: DEFAULT_AGENT.to_owned(),
            qc: None,
            rollback: RollbackManager::disabled(),
            checkpointer: None,
            store: None,
            updater: None,
            logger: None,
            analyzer: FailureAnalyzer::new(None, 2),
            swapper: None,
            warmup: None,
            pattern: None,
            estimation: None,
            budget: None,
            invoke_options: InvokeOptions::default(),
        }
    }

    pub fn with_default_agent(mut self, agent: impl Into<String>) -> Self {
        self.default_agent = agent.into();
        self
    }

    pub fn with_quality_controller(mut self, qc: QualityController) -> Self {
        self.qc = Some(qc);
        self
    }

    pub fn with_rollback(
        mut self,
        manager: RollbackManager,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        self.rollback = manager;
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.analyzer = FailureAnalyzer::new(Some(Arc::clone(&store)), 2);
        self.store = Some(store);
        self
    }

    pub fn with_updater(mut self, updater: Arc<dyn PlanUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_swapper(mut self, swapper: AgentSwapper) -> Self {
        self.swapper = Some(swapper);
        self
    }

    pub fn with_warmup(mut self, hook: WarmUpHook) -> Self {
        self.warmup = Some(hook);
        self
    }

    pub fn with_pattern_intelligence(mut self, hook: PatternIntelligenceHook) -> Self {
        self.pattern = Some(hook);
        self
    }

    pub fn with_estimation(mut self, hook: EstimationHook) -> Self {
        self.estimation = Some(hook);
        self
    }

    pub fn with_budget(mut self, tracker: Arc<BudgetTracker>) -> Self {
        self.budget = Some(tracker);
        self
    }

    pub fn with_invoke_options(mut self, options: InvokeOptions) -> Self {
        self.invoke_options = options;
        self
    }

    /// Run `task` through the full state machine.
    ///
    /// Always returns a result; collaborator failures are folded into it.
    pub async fn execute(
        &self,
        task: &Task,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult> {
        let started = Instant::now();
        let mut task = task.clone();

        info!(task = %task.number, name = %task.name, "executing task");

        // -- Pre-hooks, fixed order, each degrading gracefully ------------

        let analysis = self
            .analyzer
            .analyze(ctx.plan_file.as_deref(), &task)
            .await;

        if let Some(warmup) = &self.warmup {
            warmup.inject(&mut task).await;
        }

        if let Some(pattern) = &self.pattern
            && let PatternOutcome::Block { reason } = pattern.check(&mut task).await
        {
            info!(task = %task.number, reason = %reason, "task blocked by pattern intelligence");
            let mut result = TaskResult::failed(&task, format!("blocked by pattern intelligence: {reason}"));
            result.duration = started.elapsed();
            return Ok(result);
        }

        if let Some(estimation) = &self.estimation {
            estimation.pre_task(&mut task).await;
        }

        // -- Attempt loop --------------------------------------------------

        let qc_config = &self.config.quality_control;
        let max_retries = qc_config.retry_on_red;
        let mut attempt: u32 = 1;
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut checkpoint: Option<CheckpointInfo> = None;

        let (status, output, error, feedback) = loop {
            let agent = task
                .agent
                .clone()
                .unwrap_or_else(|| self.default_agent.clone());

            checkpoint = self.refresh_checkpoint(checkpoint, &task).await;

            // Invoking.
            let invocation = tokio::select! {
                invocation = self.invoker.invoke(&agent, &task.prompt, &self.invoke_options) => invocation,
                () = cancel.cancelled() => {
                    let mut result = TaskResult::failed(&task, "context canceled");
                    result.duration = started.elapsed();
                    result.history = history;
                    return Ok(result);
                }
            };

            let invocation = match invocation {
                Ok(invocation) => invocation,
                Err(e) => {
                    let message = format!("{e:#}");
                    history.push(AttemptRecord {
                        attempt,
                        agent: agent.clone(),
                        verdict: Verdict::Failed,
                        qc_feedback: message.clone(),
                    });
                    break (Verdict::Failed, String::new(), Some(message), None);
                }
            };

            if let Some(budget) = &self.budget {
                budget.record_duration(invocation.duration);
            }

            if invocation.exit_code != 0 && invocation.output.trim().is_empty() {
                let message = format!("agent {agent} exited with code {} and no output", invocation.exit_code);
                history.push(AttemptRecord {
                    attempt,
                    agent,
                    verdict: Verdict::Failed,
                    qc_feedback: message.clone(),
                });
                break (Verdict::Failed, String::new(), Some(message), None);
            }

            // Reviewing.
            let outcome = if !qc_config.enabled {
                QcOutcome::accepted()
            } else if let Some(qc) = &self.qc {
                let review = tokio::select! {
                    review = qc.review(&task, qc_config, &invocation.output) => review,
                    () = cancel.cancelled() => {
                        let mut result = TaskResult::failed(&task, "context canceled");
                        result.duration = started.elapsed();
                        result.history = history;
                        return Ok(result);
                    }
                };
                match review {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(task = %task.number, error = %e, "quality control failed, accepting output");
                        QcOutcome::accepted()
                    }
                }
            } else {
                QcOutcome::accepted()
            };

            history.push(AttemptRecord {
                attempt,
                agent: agent.clone(),
                verdict: outcome.verdict,
                qc_feedback: outcome.feedback.clone(),
            });

            // Deciding.
            match outcome.verdict {
                Verdict::Green | Verdict::Yellow => {
                    self.discard_checkpoint(&mut checkpoint).await;
                    break (outcome.verdict, invocation.output, None, Some(outcome.feedback));
                }
                Verdict::Red if attempt <= max_retries && outcome.retry => {
                    // Retrying.
                    self.swap_agent(&mut task, &agent, &outcome, analysis.as_ref());
                    attempt += 1;
                    continue;
                }
                verdict => {
                    // Attempts exhausted (or a non-retryable verdict).
                    if self.rollback.should_rollback(verdict, attempt, max_retries) {
                        if let Err(e) = self.rollback.perform_rollback(checkpoint.as_ref()).await {
                            warn!(task = %task.number, error = %e, "rollback failed");
                        }
                    }
                    break (verdict, invocation.output, None, Some(outcome.feedback));
                }
            }
        };

        // -- Recording ------------------------------------------------------

        task.execution_duration = Some(started.elapsed());

        let result = TaskResult {
            task_number: task.number.clone(),
            task_name: task.name.clone(),
            status,
            output,
            error,
            duration: started.elapsed(),
            retry_count: attempt - 1,
            history,
            review_feedback: feedback.filter(|f| !f.is_empty()),
        };

        if let Some(updater) = &self.updater
            && let Err(e) = updater.update_task_feedback(&task, &result).await
        {
            warn!(task = %task.number, error = %e, "plan feedback update failed");
        }

        self.record(&task, &result, ctx).await;

        if let Some(estimation) = &self.estimation {
            estimation.post_task(&task);
        }

        Ok(result)
    }

    /// Replace the superseded checkpoint with a fresh one for the next
    /// attempt. Checkpoints are only captured when rollback is live.
    async fn refresh_checkpoint(
        &self,
        previous: Option<CheckpointInfo>,
        task: &Task,
    ) -> Option<CheckpointInfo> {
        if !self.rollback.is_enabled() {
            return None;
        }
        let checkpointer = self.checkpointer.as_ref()?;

        if let Some(old) = previous
            && let Err(e) = checkpointer.delete_checkpoint(&old.branch_name).await
        {
            debug!(branch = %old.branch_name, error = %e, "stale checkpoint not deleted");
        }

        match checkpointer.create_checkpoint(&task.number).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(task = %task.number, error = %e, "checkpoint creation failed, continuing without");
                None
            }
        }
    }

    /// Delete a checkpoint after a successful attempt. Best-effort.
    async fn discard_checkpoint(&self, checkpoint: &mut Option<CheckpointInfo>) {
        let (Some(info), Some(checkpointer)) = (checkpoint.take(), self.checkpointer.as_ref())
        else {
            return;
        };
        if let Err(e) = checkpointer.delete_checkpoint(&info.branch_name).await {
            debug!(branch = %info.branch_name, error = %e, "checkpoint cleanup failed");
        }
    }

    /// Pick the agent for the next attempt. The reviewer's explicit
    /// suggestion wins over the intelligent swapper; nothing changes when
    /// swapping is disabled.
    fn swap_agent(
        &self,
        task: &mut Task,
        current: &str,
        outcome: &QcOutcome,
        analysis: Option<&crate::store::FailureAnalysis>,
    ) {
        if !self.config.quality_control.swap_during_retries {
            return;
        }

        let mut proposal = outcome
            .suggested_agent
            .clone()
            .filter(|suggested| suggested != current)
            .map(|agent| (agent, "reviewer"));

        if proposal.is_none()
            && let (Some(swapper), Some(analysis)) = (&self.swapper, analysis)
        {
            proposal = swapper
                .propose(analysis, current)
                .map(|agent| (agent, "history"));
        }

        if let Some((next, origin)) = proposal {
            if let Some(logger) = &self.logger {
                logger.agent_swap(&task.number, current, &next, origin);
            }
            info!(task = %task.number, from = current, to = %next, origin, "swapping agent for retry");
            task.agent = Some(next);
        }
    }

    /// Append the execution to the learning store. Best-effort.
    async fn record(&self, task: &Task, result: &TaskResult, ctx: &RunContext) {
        let Some(store) = &self.store else {
            return;
        };

        let plan_file = task
            .source_file
            .as_deref()
            .or(ctx.plan_file.as_deref())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let agent = result
            .history
            .last()
            .map(|a| a.agent.clone())
            .or_else(|| task.agent.clone())
            .unwrap_or_else(|| self.default_agent.clone());

        let record = TaskExecution {
            plan_file,
            run_number: ctx.run_number,
            task_number: task.number.clone(),
            task_name: task.name.clone(),
            agent,
            prompt: task.prompt.clone(),
            success: result.is_completed(),
            output: result.output.clone(),
            error_message: result.error.clone(),
            duration_secs: result.duration.as_secs_f64(),
            qc_verdict: Some(result.status.to_string()),
            recorded_at: None,
        };

        if let Err(e) = store.record_execution(&record).await {
            warn!(task = %task.number, error = %e, "learning store append failed");
        }
    }
}
