//! Integration tests for wave dispatch: ordering, concurrency bounds,
//! package exclusion, gates, and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use maestro_core::config::{BudgetCheckInterval, BudgetConfig, ExecutionConfig};
use maestro_core::executor::{RunContext, TaskExecutor, WaveExecutor};
use maestro_core::hooks::{BudgetTracker, GuardDecision, GuardProtocol};
use maestro_core::invoke::{Invocation, InvokeOptions, Invoker};
use maestro_core::model::{Task, TaskStatus, Verdict, Wave};
use maestro_test_utils::{LogEvent, RecordingLogger, ScriptedCall, ScriptedInvoker};

fn ctx() -> RunContext {
    RunContext {
        session_id: "session-test".to_owned(),
        run_number: 1,
        plan_file: Some("plan.toml".into()),
    }
}

fn wave_executor(invoker: Arc<dyn Invoker>, config: ExecutionConfig) -> WaveExecutor {
    let task_executor = Arc::new(TaskExecutor::new(invoker, config.clone()));
    WaveExecutor::new(task_executor, config)
}

/// Invoker that tracks how many invocations run at once and sleeps long
/// enough for overlap to be observable.
struct GaugeInvoker {
    current: AtomicUsize,
    max_seen: AtomicUsize,
    hold: Duration,
}

impl GaugeInvoker {
    fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            hold,
        })
    }

    fn max_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for GaugeInvoker {
    async fn invoke(&self, _agent: &str, _prompt: &str, _opts: &InvokeOptions) -> Result<Invocation> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(Invocation {
            output: "ok".to_owned(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

/// Invoker whose per-task delay is derived from the task number, so
/// higher-numbered tasks finish first.
struct ReverseDelayInvoker;

#[async_trait]
impl Invoker for ReverseDelayInvoker {
    async fn invoke(&self, _agent: &str, prompt: &str, _opts: &InvokeOptions) -> Result<Invocation> {
        let number: u64 = prompt
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(20 * (4 - number.min(3)))).await;
        Ok(Invocation {
            output: format!("output-{number}"),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

#[tokio::test]
async fn results_follow_wave_declaration_order() {
    // Task 1 finishes last, task 3 first; results still come back 1, 2, 3.
    let executor = wave_executor(Arc::new(ReverseDelayInvoker), ExecutionConfig::default());
    let plan = maestro_test_utils::plan(&["1", "2", "3"]);

    let results = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = results.iter().map(|r| r.task_number.as_str()).collect();
    assert_eq!(order, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn concurrency_is_bounded_by_the_wave() {
    let gauge = GaugeInvoker::new(Duration::from_millis(60));
    let executor = wave_executor(Arc::clone(&gauge) as _, ExecutionConfig::default());

    let mut plan = maestro_test_utils::plan(&["1", "2", "3", "4"]);
    plan.waves[0].max_concurrency = 2;

    executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(gauge.max_seen() <= 2, "saw {} concurrent workers", gauge.max_seen());
}

#[tokio::test]
async fn zero_concurrency_means_all_at_once() {
    let gauge = GaugeInvoker::new(Duration::from_millis(60));
    let executor = wave_executor(Arc::clone(&gauge) as _, ExecutionConfig::default());

    let plan = maestro_test_utils::plan(&["1", "2", "3"]);
    executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(gauge.max_seen(), 3);
}

#[tokio::test]
async fn shared_packages_serialize_execution() {
    let gauge = GaugeInvoker::new(Duration::from_millis(40));
    let executor = wave_executor(Arc::clone(&gauge) as _, ExecutionConfig::default());

    let mut plan = maestro_test_utils::plan(&["1", "2", "3"]);
    for task in plan.tasks.values_mut() {
        task.packages = vec!["core".to_owned()];
    }

    executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    // All three tasks share a package, so no two invocations overlap.
    assert_eq!(gauge.max_seen(), 1);
}

#[tokio::test]
async fn skip_completed_synthesizes_green_results() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let executor = wave_executor(Arc::clone(&invoker) as _, ExecutionConfig::default());

    let mut plan = maestro_test_utils::plan(&["1", "2", "3"]);
    {
        let task = plan.tasks.get_mut("1").unwrap();
        task.status = TaskStatus::Completed;
        task.completed_at = Some(chrono::Utc::now());
    }

    let results = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].task_number, "1");
    assert_eq!(results[0].status, Verdict::Green);
    assert_eq!(results[0].output, "Skipped");
    assert_eq!(results[1].output, "ran");
    assert_eq!(results[2].output, "ran");
    // Only the two real tasks hit the invoker.
    assert_eq!(invoker.agents().len(), 2);
}

#[tokio::test]
async fn rerun_completed_executes_everything() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let config = ExecutionConfig {
        rerun_completed: true,
        ..Default::default()
    };
    let executor = wave_executor(Arc::clone(&invoker) as _, config);

    let mut plan = maestro_test_utils::plan(&["1", "2"]);
    plan.tasks.get_mut("1").unwrap().status = TaskStatus::Completed;

    let results = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(results.iter().all(|r| r.output == "ran"));
    assert_eq!(invoker.agents().len(), 2);
}

// ---------------------------------------------------------------------------
// Guard protocol
// ---------------------------------------------------------------------------

struct BlockFirstSwapSecond;

#[async_trait]
impl GuardProtocol for BlockFirstSwapSecond {
    async fn assess_wave(&self, tasks: &[Task]) -> Result<Vec<GuardDecision>> {
        let mut decisions = Vec::new();
        if let Some(first) = tasks.first() {
            decisions.push(GuardDecision {
                task_number: first.number.clone(),
                should_block: true,
                reason: "historically destructive".to_owned(),
                risk_factors: vec!["touches migrations".to_owned()],
                suggested_agent: None,
            });
        }
        if let Some(second) = tasks.get(1) {
            decisions.push(GuardDecision {
                task_number: second.number.clone(),
                should_block: false,
                reason: String::new(),
                risk_factors: vec![],
                suggested_agent: Some("rust-pro".to_owned()),
            });
        }
        Ok(decisions)
    }
}

#[tokio::test]
async fn guard_protocol_blocks_and_swaps() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let logger = RecordingLogger::new();
    let task_executor = Arc::new(TaskExecutor::new(
        Arc::clone(&invoker) as _,
        ExecutionConfig::default(),
    ));
    let executor = WaveExecutor::new(task_executor, ExecutionConfig::default())
        .with_guard_protocol(Arc::new(BlockFirstSwapSecond))
        .with_logger(Arc::clone(&logger) as _);

    let plan = maestro_test_utils::plan(&["1", "2", "3"]);
    let results = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, Verdict::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("blocked by guard"));
    assert!(results[0]
        .review_feedback
        .as_deref()
        .unwrap()
        .contains("touches migrations"));

    // Task 2 was dispatched with the swapped agent; task 1 never ran.
    assert!(invoker.agents().contains(&"rust-pro".to_owned()));
    assert_eq!(invoker.agents().len(), 2);

    let events = logger.events();
    assert!(events.contains(&LogEvent::GuardPrediction("1".to_owned())));
    assert!(events.iter().any(|e| matches!(
        e,
        LogEvent::AgentSwap { task, to, origin, .. }
            if task == "2" && to == "rust-pro" && origin == "guard"
    )));
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

#[tokio::test]
async fn budget_exceeded_aborts_subsequent_waves() {
    let invoker: Arc<dyn Invoker> = Arc::new(ScriptedInvoker::always("ran"));
    let logger = RecordingLogger::new();

    // 10ms scripted invocations at an absurd rate blow a tiny budget.
    let tracker = Arc::new(BudgetTracker::new(BudgetConfig {
        max_cost_per_run: 0.0001,
        warn_threshold: 0.8,
        check_interval: BudgetCheckInterval::PerWave,
        cost_per_minute: 1000.0,
    }));

    let config = ExecutionConfig::default();
    let task_executor = Arc::new(
        TaskExecutor::new(Arc::clone(&invoker), config.clone()).with_budget(Arc::clone(&tracker)),
    );
    let executor = WaveExecutor::new(task_executor, config)
        .with_budget(Arc::clone(&tracker))
        .with_logger(Arc::clone(&logger) as _);

    let mut plan = maestro_test_utils::plan(&["1", "2"]);
    plan.waves = vec![
        Wave {
            name: "wave-1".to_owned(),
            task_numbers: vec!["1".to_owned()],
            max_concurrency: 0,
        },
        Wave {
            name: "wave-2".to_owned(),
            task_numbers: vec!["2".to_owned()],
            max_concurrency: 0,
        },
    ];

    let failure = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(failure.source.to_string().contains("budget exceeded"));
    // Wave 1 completed; wave 2 never dispatched.
    assert_eq!(failure.results.len(), 1);
    assert_eq!(failure.results[0].task_number, "1");
    assert_eq!(
        logger.count(|e| matches!(e, LogEvent::WaveStart(name) if name == "wave-2")),
        0
    );
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_failures_raise_an_anomaly() {
    let invoker = Arc::new(ScriptedInvoker::new(vec![
        ScriptedCall::Ok { output: String::new(), exit_code: 1 },
        ScriptedCall::Ok { output: String::new(), exit_code: 1 },
        ScriptedCall::Ok { output: String::new(), exit_code: 1 },
    ]));
    let logger = RecordingLogger::new();

    let config = ExecutionConfig::default(); // anomaly_threshold = 3
    let task_executor = Arc::new(TaskExecutor::new(Arc::clone(&invoker) as _, config.clone()));
    let executor =
        WaveExecutor::new(task_executor, config).with_logger(Arc::clone(&logger) as _);

    let mut plan = maestro_test_utils::plan(&["1", "2", "3"]);
    plan.waves[0].max_concurrency = 1;

    let results = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(results.iter().all(|r| r.is_failed()));
    assert!(logger
        .events()
        .iter()
        .any(|e| matches!(e, LogEvent::Anomaly { streak: 3, .. })));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pre_canceled_context_launches_nothing() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let logger = RecordingLogger::new();
    let task_executor = Arc::new(TaskExecutor::new(
        Arc::clone(&invoker) as _,
        ExecutionConfig::default(),
    ));
    let executor = WaveExecutor::new(task_executor, ExecutionConfig::default())
        .with_logger(Arc::clone(&logger) as _);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let plan = maestro_test_utils::plan(&["1", "2"]);
    let failure = executor.execute_plan(&plan, &ctx(), &cancel).await.unwrap_err();

    assert!(failure.source.to_string().contains("context canceled"));
    assert!(failure.results.is_empty());
    assert!(invoker.agents().is_empty());
    assert_eq!(logger.count(|e| matches!(e, LogEvent::WaveStart(_))), 0);
    assert_eq!(logger.count(|e| matches!(e, LogEvent::WaveComplete(_))), 0);
}

#[tokio::test]
async fn unknown_wave_task_is_a_wave_error() {
    let invoker = Arc::new(ScriptedInvoker::always("ran"));
    let executor = wave_executor(Arc::clone(&invoker) as _, ExecutionConfig::default());

    let mut plan = maestro_test_utils::plan(&["1"]);
    plan.waves[0].task_numbers.push("404".to_owned());

    let failure = executor
        .execute_plan(&plan, &ctx(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(failure.source.to_string().contains("unknown task \"404\""));
}
