//! Integration tests for the orchestrator: merging, hooks, aggregation,
//! and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use maestro_core::Orchestrator;
use maestro_core::branch_guard::{BranchGuard, BranchGuardHook};
use maestro_core::config::{BranchGuardConfig, ExecutionConfig};
use maestro_core::error::OrchestratorError;
use maestro_core::executor::{TaskExecutor, WaveExecutor};
use maestro_core::hooks::SetupHook;
use maestro_core::model::{TaskStatus, Verdict};
use maestro_core::store::LearningStore;
use maestro_test_utils::{
    FakeCheckpointer, LogEvent, MemoryLearningStore, RecordingLogger, ScriptedCall,
    ScriptedInvoker,
};

fn orchestrator(invoker: Arc<ScriptedInvoker>, config: ExecutionConfig) -> Orchestrator {
    let task_executor = Arc::new(TaskExecutor::new(invoker as _, config.clone()));
    let wave_executor = Arc::new(WaveExecutor::new(task_executor, config.clone()));
    Orchestrator::new(wave_executor, config)
}

#[tokio::test]
async fn no_plans_is_a_plan_required_error() {
    let orch = orchestrator(Arc::new(ScriptedInvoker::always("ok")), ExecutionConfig::default());
    let failure = orch
        .execute(vec![], CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.source.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::PlanRequired)
    ));
    assert_eq!(failure.result.total_tasks, 0);
}

#[tokio::test]
async fn aggregates_completed_and_failed_counts() {
    // Task order within the wave is 1, 2, 3; task 2 fails.
    let invoker = Arc::new(ScriptedInvoker::new(vec![
        ScriptedCall::ok("fine"),
        ScriptedCall::Ok { output: String::new(), exit_code: 1 },
        ScriptedCall::ok("fine"),
    ]));
    let config = ExecutionConfig {
        session_id: Some("session-fixed".to_owned()),
        ..Default::default()
    };
    let mut plan = maestro_test_utils::plan(&["1", "2", "3"]);
    plan.waves[0].max_concurrency = 1;

    let orch = orchestrator(Arc::clone(&invoker), config);
    let result = orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    assert_eq!(result.session_id, "session-fixed");
    assert_eq!(result.total_tasks, 3);
    assert_eq!(result.completed, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_tasks, vec!["2"]);
    assert!(result.completed + result.failed <= result.total_tasks);
}

#[tokio::test]
async fn skipped_tasks_count_as_completed() {
    // Scenario: 3 tasks, the first already completed in a prior run.
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let mut plan = maestro_test_utils::plan(&["1", "2", "3"]);
    {
        let task = plan.tasks.get_mut("1").unwrap();
        task.status = TaskStatus::Completed;
        task.completed_at = Some(chrono::Utc::now());
    }

    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default());
    let result = orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    assert_eq!(result.total_tasks, 3);
    assert_eq!(result.completed, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(result.task_results[0].output, "Skipped");
    assert_eq!(result.task_results[0].status, Verdict::Green);
}

#[tokio::test]
async fn merges_plans_before_executing() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));

    let mut plan_a = maestro_test_utils::plan(&["1", "2"]);
    plan_a.file_path = Some("a.toml".into());
    let mut plan_b = maestro_test_utils::plan(&["3"]);
    plan_b.file_path = Some("b.toml".into());
    plan_b.tasks.get_mut("3").unwrap().depends_on = vec!["1".to_owned(), "2".to_owned()];
    plan_b.waves[0].name = "wave-b".to_owned();

    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default());
    let result = orch
        .execute(vec![plan_a, plan_b], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_tasks, 3);
    assert_eq!(result.completed, 3);
}

#[tokio::test]
async fn duplicate_task_numbers_fail_the_merge() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let plan_a = maestro_test_utils::plan(&["1"]);
    let plan_b = maestro_test_utils::plan(&["1"]);

    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default());
    let failure = orch
        .execute(vec![plan_a, plan_b], CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.source.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::DuplicateTaskNumber { .. })
    ));
    assert!(invoker.agents().is_empty());
}

// ---------------------------------------------------------------------------
// Hook ordering
// ---------------------------------------------------------------------------

/// Setup hook that captures how many checkpointer calls had happened by
/// the time it ran.
struct OrderProbe {
    checkpointer: Arc<FakeCheckpointer>,
    guard_calls_at_setup: AtomicUsize,
    runs: AtomicUsize,
}

#[async_trait]
impl SetupHook for OrderProbe {
    async fn run(&self) -> Result<()> {
        self.guard_calls_at_setup
            .store(self.checkpointer.calls().len(), Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn branch_guard_runs_strictly_before_setup() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let checkpointer = FakeCheckpointer::new("main", true);

    let guard = BranchGuard::new(
        Arc::clone(&checkpointer) as _,
        BranchGuardConfig::default(),
        "plan",
    );
    let probe = Arc::new(OrderProbe {
        checkpointer: Arc::clone(&checkpointer),
        guard_calls_at_setup: AtomicUsize::new(0),
        runs: AtomicUsize::new(0),
    });

    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default())
        .with_branch_guard(BranchGuardHook::new(Some(guard)))
        .with_setup_hook(Arc::clone(&probe) as _);

    let plan = maestro_test_utils::plan(&["1"]);
    orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
    // The guard had already queried and switched branches when setup ran.
    assert!(probe.guard_calls_at_setup.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn dirty_tree_aborts_before_setup_and_waves() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let checkpointer = FakeCheckpointer::new("main", false);

    let config = BranchGuardConfig {
        require_clean_state: true,
        ..Default::default()
    };
    let guard = BranchGuard::new(Arc::clone(&checkpointer) as _, config, "plan");
    let probe = Arc::new(OrderProbe {
        checkpointer: Arc::clone(&checkpointer),
        guard_calls_at_setup: AtomicUsize::new(0),
        runs: AtomicUsize::new(0),
    });

    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default())
        .with_branch_guard(BranchGuardHook::new(Some(guard)))
        .with_setup_hook(Arc::clone(&probe) as _);

    let plan = maestro_test_utils::plan(&["1"]);
    let failure = orch.execute(vec![plan], CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        failure.source.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::DirtyWorkingTree)
    ));
    assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    assert!(invoker.agents().is_empty());
}

// ---------------------------------------------------------------------------
// Learning store integration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_number_derives_from_the_store() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let store = MemoryLearningStore::new();

    // A prior run left records at run 4.
    store
        .record_execution(&maestro_core::store::TaskExecution {
            plan_file: "plan.toml".to_owned(),
            run_number: 4,
            task_number: "1".to_owned(),
            task_name: "task-1".to_owned(),
            agent: "rust-pro".to_owned(),
            prompt: "p".to_owned(),
            success: true,
            output: String::new(),
            error_message: None,
            duration_secs: 1.0,
            qc_verdict: Some("GREEN".to_owned()),
            recorded_at: None,
        })
        .await
        .unwrap();

    let config = ExecutionConfig::default();
    let task_executor = Arc::new(
        TaskExecutor::new(Arc::clone(&invoker) as _, config.clone())
            .with_store(Arc::clone(&store) as _),
    );
    let wave_executor = Arc::new(WaveExecutor::new(task_executor, config.clone()));
    let orch = Orchestrator::new(wave_executor, config).with_store(Arc::clone(&store) as _);

    let plan = maestro_test_utils::plan(&["2"]);
    orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    let new_records: Vec<_> = store
        .records()
        .into_iter()
        .filter(|r| r.task_number == "2")
        .collect();
    assert_eq!(new_records.len(), 1);
    assert_eq!(new_records[0].run_number, 5);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pre_canceled_context_yields_cancellation_error() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let logger = RecordingLogger::new();

    let config = ExecutionConfig::default();
    let task_executor = Arc::new(TaskExecutor::new(Arc::clone(&invoker) as _, config.clone()));
    let wave_executor = Arc::new(
        WaveExecutor::new(task_executor, config.clone()).with_logger(Arc::clone(&logger) as _),
    );
    let orch = Orchestrator::new(wave_executor, config).with_logger(Arc::clone(&logger) as _);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let plan = maestro_test_utils::plan(&["1", "2"]);
    let failure = orch.execute(vec![plan], cancel).await.unwrap_err();

    assert!(failure.source.to_string().contains("context canceled"));
    assert!(failure.result.task_results.is_empty());
    assert_eq!(failure.result.completed, 0);
    assert_eq!(failure.result.failed, 0);
    assert_eq!(logger.count(|e| matches!(e, LogEvent::WaveStart(_))), 0);
    assert_eq!(logger.count(|e| matches!(e, LogEvent::WaveComplete(_))), 0);
}

#[tokio::test]
async fn summary_is_logged_once_per_run() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let logger = RecordingLogger::new();

    let config = ExecutionConfig::default();
    let task_executor = Arc::new(TaskExecutor::new(Arc::clone(&invoker) as _, config.clone()));
    let wave_executor = Arc::new(WaveExecutor::new(task_executor, config.clone()));
    let orch = Orchestrator::new(wave_executor, config).with_logger(Arc::clone(&logger) as _);

    let plan = maestro_test_utils::plan(&["1"]);
    orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    assert_eq!(logger.count(|e| matches!(e, LogEvent::Summary)), 1);
}

#[tokio::test]
async fn session_id_is_synthesized_when_unset() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let orch = orchestrator(Arc::clone(&invoker), ExecutionConfig::default());

    let plan = maestro_test_utils::plan(&["1"]);
    let result = orch.execute(vec![plan], CancellationToken::new()).await.unwrap();

    assert!(result.session_id.starts_with("session-"));
    // session-YYYYMMDD-HHMM
    assert_eq!(result.session_id.len(), "session-".len() + 13);
}
