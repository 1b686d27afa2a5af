//! Shared test doubles for maestro integration tests.
//!
//! Scripted collaborators record every call they receive and answer from
//! a pre-loaded script, so tests assert on both behavior and interaction
//! order without any external process or database.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;

use maestro_core::checkpoint::Checkpointer;
use maestro_core::invoke::{Invocation, InvokeOptions, Invoker};
use maestro_core::logging::ExecutionLogger;
use maestro_core::model::{
    CheckpointInfo, ExecutionResult, Plan, Task, TaskResult, Verdict, Wave,
};
use maestro_core::plan::PlanUpdater;
use maestro_core::review::{ReviewResult, Reviewer};
use maestro_core::store::{FailureAnalysis, LearningStore, TaskExecution};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// A pending task with the given number.
pub fn task(number: &str) -> Task {
    Task::new(number, format!("task-{number}"), format!("do task {number}"))
}

/// A single-wave plan over `numbers` with unlimited concurrency.
pub fn plan(numbers: &[&str]) -> Plan {
    let mut plan = Plan::default();
    for number in numbers {
        let t = task(number);
        plan.tasks.insert(t.number.clone(), t);
    }
    plan.waves = vec![Wave {
        name: "wave-1".to_owned(),
        task_numbers: numbers.iter().map(|n| n.to_string()).collect(),
        max_concurrency: 0,
    }];
    plan.file_path = Some("plan.toml".into());
    plan
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// One scripted invocation outcome.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    Ok { output: String, exit_code: i32 },
    Err(String),
}

impl ScriptedCall {
    pub fn ok(output: &str) -> Self {
        Self::Ok {
            output: output.to_owned(),
            exit_code: 0,
        }
    }
}

/// Invoker that answers from a script and records `(agent, prompt)` pairs.
/// When the script runs dry it keeps answering with the fallback success.
pub struct ScriptedInvoker {
    script: Mutex<VecDeque<ScriptedCall>>,
    calls: Mutex<Vec<(String, String)>>,
    fallback: String,
}

impl Default for ScriptedInvoker {
    fn default() -> Self {
        Self::new(vec![])
    }
}

impl ScriptedInvoker {
    pub fn new(script: Vec<ScriptedCall>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            fallback: "ok".to_owned(),
        }
    }

    /// Invoker that always succeeds with `output`.
    pub fn always(output: &str) -> Self {
        let mut invoker = Self::new(vec![]);
        invoker.fallback = output.to_owned();
        invoker
    }

    /// Every `(agent, prompt)` pair received, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// The agent names invoked, in order.
    pub fn agents(&self) -> Vec<String> {
        self.calls().into_iter().map(|(agent, _)| agent).collect()
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, agent: &str, prompt: &str, _opts: &InvokeOptions) -> Result<Invocation> {
        self.calls
            .lock()
            .unwrap()
            .push((agent.to_owned(), prompt.to_owned()));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedCall::Ok { output, exit_code }) => Ok(Invocation {
                output,
                exit_code,
                duration: Duration::from_millis(10),
            }),
            Some(ScriptedCall::Err(message)) => Err(anyhow!(message)),
            None => Ok(Invocation {
                output: self.fallback.clone(),
                exit_code: 0,
                duration: Duration::from_millis(10),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Reviewer
// ---------------------------------------------------------------------------

/// Reviewer that answers from a script, one result per review call, and
/// falls back to GREEN when the script runs dry.
#[derive(Default)]
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<ReviewResult>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedReviewer {
    pub fn new(script: Vec<ReviewResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn green() -> ReviewResult {
        ReviewResult {
            flag: Verdict::Green,
            feedback: String::new(),
            suggested_agent: None,
            retry: false,
            agent_name: "quality-control".to_owned(),
        }
    }

    pub fn red(feedback: &str, suggested_agent: Option<&str>) -> ReviewResult {
        ReviewResult {
            flag: Verdict::Red,
            feedback: feedback.to_owned(),
            suggested_agent: suggested_agent.map(str::to_owned),
            retry: true,
            agent_name: "quality-control".to_owned(),
        }
    }

    /// Reviewing agent names called, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, _task: &Task, agent_name: &str, _output: &str) -> Result<ReviewResult> {
        self.calls.lock().unwrap().push(agent_name.to_owned());
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(Self::green))
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// A coarse record of one logger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    WaveStart(String),
    WaveComplete(String),
    TaskResult(String),
    Progress(usize),
    Summary,
    GuardPrediction(String),
    AgentSwap {
        task: String,
        from: String,
        to: String,
        origin: String,
    },
    Anomaly {
        wave: String,
        streak: u32,
    },
    BudgetStatus,
    BudgetWarning,
}

/// Logger that records every call for later assertions.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&LogEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: LogEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ExecutionLogger for RecordingLogger {
    fn wave_start(&self, wave: &Wave, _task_count: usize) {
        self.push(LogEvent::WaveStart(wave.name.clone()));
    }

    fn wave_complete(&self, wave: &Wave, _duration: Duration, _results: &[TaskResult]) {
        self.push(LogEvent::WaveComplete(wave.name.clone()));
    }

    fn task_result(&self, result: &TaskResult) -> Result<()> {
        self.push(LogEvent::TaskResult(result.task_number.clone()));
        Ok(())
    }

    fn progress(&self, results: &[TaskResult]) {
        self.push(LogEvent::Progress(results.len()));
    }

    fn summary(&self, _result: &ExecutionResult) {
        self.push(LogEvent::Summary);
    }

    fn guard_prediction(&self, task_number: &str, _reason: &str, _risk_factors: &[String]) {
        self.push(LogEvent::GuardPrediction(task_number.to_owned()));
    }

    fn agent_swap(&self, task_number: &str, from: &str, to: &str, origin: &str) {
        self.push(LogEvent::AgentSwap {
            task: task_number.to_owned(),
            from: from.to_owned(),
            to: to.to_owned(),
            origin: origin.to_owned(),
        });
    }

    fn anomaly(&self, wave_name: &str, consecutive_failures: u32) {
        self.push(LogEvent::Anomaly {
            wave: wave_name.to_owned(),
            streak: consecutive_failures,
        });
    }

    fn budget_status(&self, _spent: f64, _limit: f64) {
        self.push(LogEvent::BudgetStatus);
    }

    fn budget_warning(&self, _spent: f64, _limit: f64) {
        self.push(LogEvent::BudgetWarning);
    }
}

// ---------------------------------------------------------------------------
// Learning store
// ---------------------------------------------------------------------------

/// In-memory learning store: a Vec behind a mutex.
#[derive(Default)]
pub struct MemoryLearningStore {
    records: Mutex<Vec<TaskExecution>>,
}

impl MemoryLearningStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<TaskExecution> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl LearningStore for MemoryLearningStore {
    async fn record_execution(&self, record: &TaskExecution) -> Result<()> {
        let mut record = record.clone();
        record.recorded_at = Some(Utc::now());
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn execution_history(
        &self,
        plan_file: &str,
        task_number: &str,
    ) -> Result<Vec<TaskExecution>> {
        let mut matching: Vec<TaskExecution> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.plan_file == plan_file && r.task_number == task_number)
            .cloned()
            .collect();
        matching.reverse();
        Ok(matching)
    }

    async fn run_count(&self, plan_file: &str) -> Result<u32> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.plan_file == plan_file)
            .map(|r| r.run_number)
            .max()
            .unwrap_or(0))
    }

    async fn analyze_failures(
        &self,
        plan_file: &str,
        task_number: &str,
        min_attempts: u32,
    ) -> Result<FailureAnalysis> {
        let history = self.execution_history(plan_file, task_number).await?;
        let total_attempts = history.len() as u32;
        let failed_attempts = history.iter().filter(|r| !r.success).count() as u32;

        let mut tried_agents: Vec<String> = Vec::new();
        for record in &history {
            if !tried_agents.contains(&record.agent) {
                tried_agents.push(record.agent.clone());
            }
        }

        let should_try_different_agent = total_attempts >= min_attempts
            && failed_attempts == total_attempts
            && total_attempts > 0;

        // Same derivation as the SQLite store: the most recent agent that
        // succeeded on another task in this plan and is untried here.
        let suggested_agent = if should_try_different_agent {
            self.records
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|r| {
                    r.plan_file == plan_file && r.task_number != task_number && r.success
                })
                .map(|r| r.agent.clone())
                .find(|agent| !tried_agents.contains(agent))
        } else {
            None
        };

        Ok(FailureAnalysis {
            total_attempts,
            failed_attempts,
            tried_agents,
            common_patterns: Vec::new(),
            should_try_different_agent,
            suggested_agent,
        })
    }
}

// ---------------------------------------------------------------------------
// Checkpointer
// ---------------------------------------------------------------------------

/// Checkpointer that records each operation as a formatted string.
pub struct FakeCheckpointer {
    calls: Mutex<Vec<String>>,
    current_branch: Mutex<String>,
    clean: bool,
}

impl FakeCheckpointer {
    pub fn new(current_branch: &str, clean: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            current_branch: Mutex::new(current_branch.to_owned()),
            clean,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Checkpointer for FakeCheckpointer {
    async fn create_checkpoint(&self, task_number: &str) -> Result<CheckpointInfo> {
        self.record(format!("create_checkpoint:{task_number}"));
        Ok(CheckpointInfo {
            branch_name: format!("maestro-checkpoint-{task_number}"),
            commit_hash: format!("commit-{task_number}"),
            created_at: Utc::now(),
        })
    }

    async fn restore_checkpoint(&self, commit_hash: &str) -> Result<()> {
        self.record(format!("restore_checkpoint:{commit_hash}"));
        Ok(())
    }

    async fn delete_checkpoint(&self, branch_name: &str) -> Result<()> {
        self.record(format!("delete_checkpoint:{branch_name}"));
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<()> {
        self.record(format!("create_branch:{name}"));
        Ok(())
    }

    async fn switch_branch(&self, name: &str) -> Result<()> {
        self.record(format!("switch_branch:{name}"));
        *self.current_branch.lock().unwrap() = name.to_owned();
        Ok(())
    }

    async fn current_branch(&self) -> Result<String> {
        self.record("current_branch".to_owned());
        Ok(self.current_branch.lock().unwrap().clone())
    }

    async fn is_clean_state(&self) -> Result<bool> {
        self.record("is_clean_state".to_owned());
        Ok(self.clean)
    }
}

// ---------------------------------------------------------------------------
// Plan updater
// ---------------------------------------------------------------------------

/// Updater that records `(task_number, status)` pairs.
#[derive(Default)]
pub struct RecordingUpdater {
    updates: Mutex<Vec<(String, String)>>,
}

impl RecordingUpdater {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlanUpdater for RecordingUpdater {
    async fn update_task_feedback(&self, task: &Task, result: &TaskResult) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((task.number.clone(), result.status.to_string()));
        Ok(())
    }
}
