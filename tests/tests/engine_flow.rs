use pretty_assertions::assert_eq;
use waypoint_core::{vars, CoreError, ProcessStatus, StepStatus, Variables};
use waypoint_test_utils::{assert_status, assert_variable, init_test_tracing, DefinitionBuilder};
use waypoint_tests::{order_fulfilment, TestHarness};

#[tokio::test]
async fn test_low_risk_order_runs_to_completion() -> Result<(), CoreError> {
    init_test_tracing();
    let h = TestHarness::new()?;
    h.deploy([order_fulfilment()]).await?;
    h.commands.reply("ReserveStock", vars! { "reservationId" => "r-42" });
    h.queries.answer("OrderRisk", vars! { "riskScore" => 12 });

    let instance = h
        .engine
        .start_process("order-fulfilment", Some(vars! { "orderId" => "o-1" }), None)
        .await?;

    assert_status(&instance, ProcessStatus::Completed).unwrap();
    assert_eq!(instance.current_step_id, None);
    assert!(instance.completed_at.is_some());
    assert_variable(&instance, "reservationId", "r-42").unwrap();
    assert_variable(&instance, "riskScore", 12).unwrap();
    assert_eq!(h.commands.command_names(), vec!["ReserveStock", "ShipOrder"]);

    let steps: Vec<(String, StepStatus)> = h
        .steps(&instance.id)
        .await?
        .into_iter()
        .map(|s| (s.step_definition_id, s.status))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("reserve".to_string(), StepStatus::Completed),
            ("assess".to_string(), StepStatus::Completed),
            ("ship".to_string(), StepStatus::Completed),
        ]
    );

    assert_eq!(
        h.events.event_types_for(&instance.id),
        vec![
            "process_instance.started",
            "step.started",
            "step.completed",
            "step.started",
            "step.completed",
            "step.started",
            "step.completed",
            "process_instance.completed",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_step_output_overwrites_variables() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("status")
        .business("mark", "MarkReserved", None)
        .build()])
    .await?;
    h.commands.reply("MarkReserved", vars! { "status" => "reserved" });

    let instance = h
        .engine
        .start_process("status", Some(vars! { "status" => "new", "orderId" => "o-9" }), None)
        .await?;

    assert_variable(&instance, "status", "reserved").unwrap();
    assert_variable(&instance, "orderId", "o-9").unwrap();
    Ok(())
}

#[tokio::test]
async fn test_business_parameters_are_merged_over_variables() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("notify")
        .business_with(
            "send",
            "SendEmail",
            vars! { "template" => "welcome", "locale" => "de" },
            None,
        )
        .build()])
    .await?;

    h.engine
        .start_process("notify", Some(vars! { "locale" => "en", "email" => "a@b.c" }), None)
        .await?;

    let (name, parameters) = h.commands.calls().remove(0);
    assert_eq!(name, "SendEmail");
    assert_eq!(parameters["locale"].as_str(), Some("de"));
    assert_eq!(parameters["email"].as_str(), Some("a@b.c"));
    assert_eq!(parameters["template"].as_str(), Some("welcome"));
    Ok(())
}

#[tokio::test]
async fn test_decision_takes_lowest_priority_matching_route() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("routing")
        .decision(
            "route",
            "Score",
            &[("gold", "score > 100", 2), ("silver", "score > 10", 1)],
        )
        .business("gold", "Gold", None)
        .business("silver", "Silver", None)
        .build()])
    .await?;
    h.queries.answer("Score", vars! { "score" => 500 });

    let instance = h.engine.start_process("routing", None, None).await?;

    assert_status(&instance, ProcessStatus::Completed).unwrap();
    assert_eq!(h.commands.command_names(), vec!["Silver"]);
    Ok(())
}

#[tokio::test]
async fn test_decision_without_matching_route_fails() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("routing")
        .decision("route", "Score", &[("gold", "score > 100", 1)])
        .business("gold", "Gold", None)
        .build()])
    .await?;
    h.queries.answer("Score", vars! { "score" => 3 });

    let instance = h.engine.start_process("routing", None, None).await?;

    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(
        instance.error_message.as_deref(),
        Some("No matching route for decision step: route")
    );
    Ok(())
}

#[tokio::test]
async fn test_command_failure_fails_step_and_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([order_fulfilment()]).await?;
    h.commands.fail("ReserveStock", "out of stock");

    let instance = h.engine.start_process("order-fulfilment", None, None).await?;

    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(instance.error_message.as_deref(), Some("out of stock"));
    assert_eq!(instance.current_step_id, None);

    let steps = h.steps(&instance.id).await?;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert_eq!(steps[0].error_message.as_deref(), Some("out of stock"));
    assert_eq!(h.events.count("process_instance.failed"), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_start_step_fails_instance() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("broken")
        .start("ghost")
        .business("real", "Real", None)
        .build()])
    .await?;

    let instance = h.engine.start_process("broken", None, None).await?;

    assert_status(&instance, ProcessStatus::Failed).unwrap();
    assert_eq!(instance.error_message.as_deref(), Some("Step not found: ghost"));
    assert!(h.commands.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_definition_is_rejected() -> Result<(), CoreError> {
    let h = TestHarness::new()?;

    let err = h
        .engine
        .start_process("nope", Some(Variables::new()), None)
        .await
        .unwrap_err();

    assert_eq!(err, CoreError::ProcessDefinitionNotFound("nope".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_start_uses_latest_or_requested_version() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([
        DefinitionBuilder::new("versioned").version(1).business("a", "V1", None).build(),
        DefinitionBuilder::new("versioned").version(2).business("a", "V2", None).build(),
    ])
    .await?;

    let latest = h.engine.start_process("versioned", None, None).await?;
    let pinned = h.engine.start_process("versioned", None, Some(1)).await?;

    assert_eq!(latest.process_version, 2);
    assert_eq!(pinned.process_version, 1);
    assert_eq!(h.commands.command_names(), vec!["V2", "V1"]);
    Ok(())
}

#[tokio::test]
async fn test_re_executing_terminal_instance_is_a_no_op() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("once").business("a", "Once", None).build()])
        .await?;

    let instance = h.engine.start_process("once", None, None).await?;
    h.engine.execute_process(&instance.id).await?;
    h.engine.execute_process(&instance.id).await?;

    assert_eq!(h.commands.call_count("Once"), 1);
    assert_eq!(h.steps(&instance.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_loops_revisit_steps_with_fresh_step_instances() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([DefinitionBuilder::new("retry")
        .decision(
            "check",
            "Attempts",
            &[("attempt", "remaining > 0", 1), ("done", "", 2)],
        )
        .business("attempt", "Attempt", Some("check"))
        .business("done", "Done", None)
        .build()])
    .await?;
    h.queries.answer("Attempts", Variables::new());
    h.commands.reply("Attempt", vars! { "remaining" => 0 });

    let instance = h
        .engine
        .start_process("retry", Some(vars! { "remaining" => 1 }), None)
        .await?;

    assert_status(&instance, ProcessStatus::Completed).unwrap();
    assert_eq!(h.commands.command_names(), vec!["Attempt", "Done"]);

    let visited: Vec<String> = h
        .steps(&instance.id)
        .await?
        .into_iter()
        .map(|s| s.step_definition_id)
        .collect();
    assert_eq!(visited, vec!["check", "attempt", "check", "done"]);
    Ok(())
}
