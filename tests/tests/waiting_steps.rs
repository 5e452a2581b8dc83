use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use waypoint_core::{vars, CoreError, ProcessStatus, ScheduledStep, StepStatus, Variables};
use waypoint_test_utils::{assert_status, assert_variable, DefinitionBuilder};
use waypoint_tests::{awaiting_payment, order_fulfilment, reminder, TestHarness};

async fn high_risk_order(h: &TestHarness) -> Result<String, CoreError> {
    h.deploy([order_fulfilment()]).await?;
    h.queries.answer("OrderRisk", vars! { "riskScore" => 85 });
    let instance = h
        .engine
        .start_process("order-fulfilment", Some(vars! { "orderId" => "o-7" }), None)
        .await?;
    Ok(instance.id)
}

#[tokio::test]
async fn test_interactive_step_waits_for_task() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    let id = high_risk_order(&h).await?;

    let instance = h.instance(&id).await?;
    assert_status(&instance, ProcessStatus::Waiting).unwrap();
    assert_eq!(instance.current_step_id.as_deref(), Some("review"));

    let issued = h.tasks.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].role, "manager");
    assert_eq!(issued[0].data["orderId"].as_str(), Some("o-7"));

    let tasks = h.task_instances(&id).await?;
    assert_eq!(tasks.len(), 1);
    assert!(!tasks[0].is_completed);

    let review = h.steps(&id).await?.pop().unwrap();
    assert_eq!(review.step_definition_id, "review");
    assert_eq!(review.status, StepStatus::WaitingForTask);
    assert_eq!(tasks[0].step_instance_id, review.id);
    Ok(())
}

#[tokio::test]
async fn test_re_executing_waiting_instance_creates_no_duplicates() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    let id = high_risk_order(&h).await?;
    let before = h.steps(&id).await?;

    for _ in 0..3 {
        h.engine.execute_process(&id).await?;
    }

    let after = h.steps(&id).await?;
    assert_eq!(after.len(), before.len());
    assert_eq!(after.last().map(|s| s.status), Some(StepStatus::WaitingForTask));
    assert_eq!(h.tasks.issued().len(), 1);
    assert_eq!(h.task_instances(&id).await?.len(), 1);
    assert_status(&h.instance(&id).await?, ProcessStatus::Waiting).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_completing_task_resumes_process() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    let id = high_risk_order(&h).await?;
    let task_id = h.tasks.issued()[0].id.clone();

    h.engine
        .complete_task(&task_id, vars! { "approved" => true, "approver" => "kim" })
        .await?;

    let instance = h.instance(&id).await?;
    assert_status(&instance, ProcessStatus::Completed).unwrap();
    assert_variable(&instance, "approved", true).unwrap();
    assert_variable(&instance, "approver", "kim").unwrap();
    assert_eq!(h.commands.command_names(), vec!["ReserveStock", "ShipOrder"]);

    let task = h.repositories.tasks.find_by_id(&task_id).await?.unwrap();
    assert!(task.is_completed);
    assert!(task.completed_at.is_some());
    assert_eq!(h.events.count("task.completed"), 1);
    Ok(())
}

#[tokio::test]
async fn test_completing_task_twice_is_rejected() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    let id = high_risk_order(&h).await?;
    let task_id = h.tasks.issued()[0].id.clone();

    h.engine.complete_task(&task_id, Variables::new()).await?;
    let err = h
        .engine
        .complete_task(&task_id, Variables::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidState(_)));
    assert_eq!(h.commands.call_count("ShipOrder"), 1);
    assert_status(&h.instance(&id).await?, ProcessStatus::Completed).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_completing_unknown_task_is_rejected() -> Result<(), CoreError> {
    let h = TestHarness::new()?;

    let err = h
        .engine
        .complete_task("task-404", Variables::new())
        .await
        .unwrap_err();

    assert_eq!(err, CoreError::TaskNotFound("task-404".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_signal_resumes_only_waiting_instances() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(None)]).await?;

    let first = h.engine.start_process("awaiting-payment", None, None).await?;
    let second = h.engine.start_process("awaiting-payment", None, None).await?;
    assert_status(&first, ProcessStatus::Waiting).unwrap();

    let step = h.steps(&first.id).await?.remove(0);
    assert_eq!(step.status, StepStatus::WaitingForSignal);
    assert_eq!(step.waiting_for_signal.as_deref(), Some("PaymentReceived"));

    let woken = h.engine.send_signal("PaymentReceived", Some(&first.id)).await?;
    assert_eq!(woken, vec![first.id.clone()]);

    let first = h.instance(&first.id).await?;
    assert_status(&first, ProcessStatus::Completed).unwrap();
    assert_status(&h.instance(&second.id).await?, ProcessStatus::Waiting).unwrap();
    assert_eq!(h.commands.call_count("CapturePayment"), 1);

    let signal_step = h.steps(&first.id).await?.remove(0);
    assert_eq!(signal_step.status, StepStatus::Completed);
    assert!(signal_step.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_signal_step_without_timeout_waits_until_signalled() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(None)]).await?;
    let instance = h.engine.start_process("awaiting-payment", None, None).await?;

    for _ in 0..3 {
        h.engine.execute_process(&instance.id).await?;
    }
    assert!(h.engine.process_scheduled_steps().await?.is_empty());

    let steps = h.steps(&instance.id).await?;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::WaitingForSignal);
    assert_eq!(steps[0].scheduled_for, None);
    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Waiting).unwrap();
    assert!(h.commands.calls().is_empty());

    let woken = h.engine.send_signal("PaymentReceived", None).await?;
    assert_eq!(woken, vec![instance.id.clone()]);
    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Completed).unwrap();
    assert_eq!(h.steps(&instance.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_signal_timeout_fails_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(Some(i64::MAX))]).await?;

    let instance = h.engine.start_process("awaiting-payment", None, None).await?;

    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(
        instance.error_message,
        Some(format!(
            "Invalid signal timeout for step await-payment: {} minutes",
            i64::MAX
        ))
    );
    assert_eq!(h.steps(&instance.id).await?[0].status, StepStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_schedule_delay_fails_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("far-future")
        .scheduled(
            "wait",
            ScheduledStep {
                delay_days: Some(200_000_000),
                ..Default::default()
            },
            Some("remind"),
        )
        .business("remind", "SendReminder", None)
        .build()])
    .await?;

    let instance = h.engine.start_process("far-future", None, None).await?;

    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(
        instance.error_message.as_deref(),
        Some("Invalid schedule delay for step: wait")
    );
    assert!(h.commands.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_broadcast_signal_wakes_every_waiting_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(None)]).await?;
    let a = h.engine.start_process("awaiting-payment", None, None).await?;
    let b = h.engine.start_process("awaiting-payment", None, None).await?;

    let mut woken = h.engine.send_signal("PaymentReceived", None).await?;
    woken.sort();
    let mut expected = vec![a.id.clone(), b.id.clone()];
    expected.sort();
    assert_eq!(woken, expected);

    // Nothing is waiting any more
    assert!(h.engine.send_signal("PaymentReceived", None).await?.is_empty());
    assert_eq!(h.commands.call_count("CapturePayment"), 2);
    Ok(())
}

#[tokio::test]
async fn test_unrelated_signal_is_ignored() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(None)]).await?;
    let instance = h.engine.start_process("awaiting-payment", None, None).await?;

    assert!(h.engine.send_signal("RefundIssued", None).await?.is_empty());
    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Waiting).unwrap();
    Ok(())
}

#[tokio::test]
async fn test_signal_timeout_fails_instance_on_sweep() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(Some(30))]).await?;
    let instance = h.engine.start_process("awaiting-payment", None, None).await?;

    let mut step = h.steps(&instance.id).await?.remove(0);
    assert_eq!(step.status, StepStatus::WaitingForSignal);
    assert!(step.scheduled_for.unwrap() > Utc::now() + Duration::minutes(29));

    // Not yet due
    assert!(h.engine.process_scheduled_steps().await?.is_empty());

    step.scheduled_for = Some(Utc::now() - Duration::seconds(1));
    h.repositories.steps.update(&step).await?;

    let swept = h.engine.process_scheduled_steps().await?;
    assert_eq!(swept, vec![instance.id.clone()]);

    let instance = h.instance(&instance.id).await?;
    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(
        instance.error_message.as_deref(),
        Some("Timeout waiting for signal: PaymentReceived")
    );
    assert_eq!(h.commands.call_count("CapturePayment"), 0);
    Ok(())
}

#[tokio::test]
async fn test_scheduled_step_resumes_when_due() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([reminder("2020-01-01T09:00:00Z")]).await?;

    let instance = h.engine.start_process("reminder", None, None).await?;
    assert_status(&instance, ProcessStatus::Waiting).unwrap();
    let step = h.steps(&instance.id).await?.remove(0);
    assert_eq!(step.status, StepStatus::WaitingForSchedule);
    assert!(h.commands.calls().is_empty());

    let swept = h.engine.process_scheduled_steps().await?;
    assert_eq!(swept, vec![instance.id.clone()]);

    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Completed).unwrap();
    assert_eq!(h.commands.command_names(), vec!["SendReminder"]);
    Ok(())
}

#[tokio::test]
async fn test_future_schedule_keeps_waiting() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([reminder("2999-01-01 00:00:00")]).await?;
    let instance = h.engine.start_process("reminder", None, None).await?;

    assert!(h.engine.process_scheduled_steps().await?.is_empty());
    h.engine.execute_process(&instance.id).await?;

    let steps = h.steps(&instance.id).await?;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::WaitingForSchedule);
    assert_eq!(steps[0].scheduled_for.map(|t| t.to_rfc3339()).as_deref(), Some("2999-01-01T00:00:00+00:00"));
    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_waiting_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([awaiting_payment(None)]).await?;
    let instance = h.engine.start_process("awaiting-payment", None, None).await?;

    h.engine.cancel_process(&instance.id).await?;

    let cancelled = h.instance(&instance.id).await?;
    assert_status(&cancelled, ProcessStatus::Cancelled).unwrap();
    assert_eq!(cancelled.current_step_id, None);
    assert!(cancelled.completed_at.is_some());
    assert_eq!(h.steps(&instance.id).await?[0].status, StepStatus::Skipped);

    assert!(h.engine.send_signal("PaymentReceived", None).await?.is_empty());
    h.engine.execute_process(&instance.id).await?;
    assert_status(&h.instance(&instance.id).await?, ProcessStatus::Cancelled).unwrap();

    let err = h.engine.cancel_process(&instance.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    assert_eq!(h.events.count("process_instance.cancelled"), 1);
    Ok(())
}
