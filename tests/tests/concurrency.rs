use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use waypoint_core::handlers::{BusinessStepHandler, SignalStepHandler};
use waypoint_core::{
    vars, CoreError, ProcessDefinition, ProcessEngine, ProcessInstance, ProcessStatus,
    ScheduleSweeper, StepDefinition, StepExecutionResult, StepHandler, StepHandlerRegistry,
    StepInstance, StepStatus, StepType, SweeperConfig, Variables,
};
use waypoint_state_inmemory::InMemoryStateStoreProvider;
use waypoint_test_utils::{
    assert_status, eventually, RecordingCommandExecutor, RecordingEventHandler,
};
use waypoint_tests::{awaiting_payment, order_fulfilment, reminder, TestHarness};

/// Signal handler that parks every re-check of a waiting step until released
struct GatedSignalHandler {
    inner: SignalStepHandler,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StepHandler for GatedSignalHandler {
    fn step_type(&self) -> StepType {
        StepType::Signal
    }

    async fn execute(
        &self,
        step: &StepDefinition,
        process_instance: &ProcessInstance,
        step_instance: &StepInstance,
    ) -> Result<StepExecutionResult, CoreError> {
        if step_instance.status == StepStatus::WaitingForSignal {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.execute(step, process_instance, step_instance).await
    }
}

async fn signal_during_recheck(scope_to_instance: bool) -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let repositories = provider.repositories();
    let commands = Arc::new(RecordingCommandExecutor::new());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let handlers = StepHandlerRegistry::from_handlers([
        Arc::new(BusinessStepHandler::new(commands.clone())) as Arc<dyn StepHandler>,
        Arc::new(GatedSignalHandler {
            inner: SignalStepHandler::new(),
            entered: entered.clone(),
            release: release.clone(),
        }),
    ])?;
    let engine = Arc::new(ProcessEngine::new(
        repositories.clone(),
        handlers,
        Arc::new(RecordingEventHandler::new()),
    ));
    let definition: ProcessDefinition = awaiting_payment(None);
    repositories.definitions.save(&definition).await?;

    let instance = engine.start_process("awaiting-payment", None, None).await?;
    assert_status(&instance, ProcessStatus::Waiting).unwrap();

    let recheck = {
        let engine = engine.clone();
        let id = instance.id.clone();
        tokio::spawn(async move { engine.execute_process(&id).await })
    };
    entered.notified().await;

    let signal = {
        let engine = engine.clone();
        let id = instance.id.clone();
        tokio::spawn(async move {
            let scope = scope_to_instance.then_some(id.as_str());
            engine.send_signal("PaymentReceived", scope).await
        })
    };
    // Let the signal reach the instance lock before the re-check finishes
    tokio::time::sleep(Duration::from_millis(50)).await;
    release.notify_one();

    recheck.await.expect("re-check panicked")?;
    let woken = signal.await.expect("signal panicked")?;

    assert_eq!(woken, vec![instance.id.clone()]);
    let instance = repositories
        .instances
        .find_by_id(&instance.id)
        .await?
        .expect("instance exists");
    assert_status(&instance, ProcessStatus::Completed).unwrap();
    assert_eq!(commands.call_count("CapturePayment"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scoped_signal_during_recheck_is_not_lost() -> Result<(), CoreError> {
    signal_during_recheck(true).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_signal_during_recheck_is_not_lost() -> Result<(), CoreError> {
    signal_during_recheck(false).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resumes_do_not_duplicate_work() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([order_fulfilment()]).await?;
    h.queries.answer("OrderRisk", vars! { "riskScore" => 99 });
    let instance = h.engine.start_process("order-fulfilment", None, None).await?;
    let before = h.steps(&instance.id).await?.len();

    let runs = (0..16).map(|_| {
        let engine = h.engine.clone();
        let id = instance.id.clone();
        tokio::spawn(async move { engine.execute_process(&id).await })
    });
    for result in join_all(runs).await {
        result.expect("task panicked")?;
    }

    assert_eq!(h.steps(&instance.id).await?.len(), before);
    assert_eq!(h.tasks.issued().len(), 1);
    assert_eq!(h.task_instances(&instance.id).await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_task_completion_succeeds_once() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([order_fulfilment()]).await?;
    h.queries.answer("OrderRisk", vars! { "riskScore" => 99 });
    let instance = h.engine.start_process("order-fulfilment", None, None).await?;
    let task_id = h.tasks.issued()[0].id.clone();

    let attempts = (0..8).map(|i| {
        let engine = h.engine.clone();
        let task_id = task_id.clone();
        tokio::spawn(async move {
            engine
                .complete_task(&task_id, vars! { "attempt" => i as i64 })
                .await
        })
    });
    let results: Vec<Result<(), CoreError>> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, CoreError::InvalidState(_))));
    assert_eq!(h.commands.call_count("ShipOrder"), 1);
    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Completed).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_sweeper_resumes_due_steps_until_shutdown() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([reminder("2020-01-01T00:00:00Z")]).await?;
    let instance = h.engine.start_process("reminder", Some(Variables::new()), None).await?;
    assert_status(&instance, ProcessStatus::Waiting).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ScheduleSweeper::new(
        Arc::clone(&h.engine),
        SweeperConfig {
            poll_interval: Duration::from_millis(20),
        },
    );
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    let repositories = h.repositories.clone();
    let id = instance.id.clone();
    let completed = eventually(Duration::from_secs(5), || {
        let repositories = repositories.clone();
        let id = id.clone();
        async move {
            matches!(
                repositories.instances.find_by_id(&id).await,
                Ok(Some(i)) if i.status == ProcessStatus::Completed
            )
        }
    })
    .await;
    assert!(completed, "sweeper did not resume the scheduled step");

    shutdown_tx.send(true).expect("sweeper stopped early");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper did not shut down")
        .expect("sweeper panicked");
    assert_eq!(h.commands.command_names(), vec!["SendReminder"]);
    Ok(())
}
