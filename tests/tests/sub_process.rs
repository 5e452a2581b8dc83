use pretty_assertions::assert_eq;
use waypoint_core::handlers::SUB_PROCESS_INSTANCE_KEY;
use waypoint_core::{vars, CoreError, ProcessStatus, StepStatus};
use waypoint_test_utils::{assert_status, assert_variable, DefinitionBuilder};
use waypoint_tests::{checkout, shipping_quote, text, TestHarness};

#[tokio::test]
async fn test_child_output_is_mapped_back_to_parent() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([
        shipping_quote(),
        checkout(
            Some(vars! { "destination" => "country", "carrier" => "DHL" }),
            Some(vars! { "shippingCost" => "price" }),
        ),
    ])
    .await?;
    h.commands
        .reply("QuoteShipping", vars! { "price" => 12.5, "currency" => "EUR" });

    let parent = h
        .engine
        .start_process("checkout", Some(vars! { "country" => "NL", "cartId" => "c-1" }), None)
        .await?;

    assert_status(&parent, ProcessStatus::Completed).unwrap();
    assert_variable(&parent, "shippingCost", 12.5).unwrap();
    assert!(!parent.variables.contains_key("price"));
    assert!(!parent.variables.contains_key("currency"));

    // The child saw only the mapped input
    let (_, quote_params) = h.commands.calls().remove(0);
    assert_eq!(quote_params.get("destination"), Some(&text("NL")));
    assert_eq!(quote_params.get("carrier"), Some(&text("DHL")));
    assert!(!quote_params.contains_key("cartId"));

    assert_eq!(
        h.commands.command_names(),
        vec!["QuoteShipping", "ConfirmCheckout"]
    );
    Ok(())
}

#[tokio::test]
async fn test_child_is_linked_to_parent() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([shipping_quote(), checkout(None, None)]).await?;

    let parent = h
        .engine
        .start_process("checkout", Some(vars! { "country" => "NL" }), None)
        .await?;

    let sub_step = h.steps(&parent.id).await?.remove(0);
    assert_eq!(sub_step.status, StepStatus::Completed);
    let child_id = sub_step.output_data[SUB_PROCESS_INSTANCE_KEY]
        .as_str()
        .unwrap()
        .to_string();

    let child = h.instance(&child_id).await?;
    assert_status(&child, ProcessStatus::Completed).unwrap();
    assert_eq!(child.parent_process_instance_id.as_deref(), Some(parent.id.as_str()));
    // Without an input mapping every parent variable is passed down
    assert_variable(&child, "country", "NL").unwrap();
    Ok(())
}

#[tokio::test]
async fn test_waiting_child_keeps_parent_waiting() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([
        DefinitionBuilder::new("shipping-quote")
            .signal("await-carrier", "CarrierQuoted", None, Some("quote"))
            .business("quote", "QuoteShipping", None)
            .build(),
        checkout(None, None),
    ])
    .await?;

    let parent = h.engine.start_process("checkout", None, None).await?;
    assert_status(&parent, ProcessStatus::Waiting).unwrap();
    assert_eq!(
        h.steps(&parent.id).await?[0].status,
        StepStatus::WaitingForTask
    );

    // Re-checking the parent while the child waits changes nothing
    h.engine.execute_process(&parent.id).await?;
    assert_eq!(h.steps(&parent.id).await?.len(), 1);

    let woken = h.engine.send_signal("CarrierQuoted", None).await?;
    assert_eq!(woken.len(), 1);

    assert_status(&h.instance(&parent.id).await?, ProcessStatus::Completed).unwrap();
    assert_eq!(
        h.commands.command_names(),
        vec!["QuoteShipping", "ConfirmCheckout"]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_child_fails_parent() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([shipping_quote(), checkout(None, None)]).await?;
    h.commands.fail("QuoteShipping", "no carrier available");

    let parent = h.engine.start_process("checkout", None, None).await?;

    assert_status(&parent, ProcessStatus::Failed).unwrap();
    assert_eq!(
        parent.error_message.as_deref(),
        Some("Sub-process failed: no carrier available")
    );
    assert_eq!(h.commands.call_count("ConfirmCheckout"), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_child_fails_parent() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([
        DefinitionBuilder::new("shipping-quote")
            .signal("await-carrier", "CarrierQuoted", None, None)
            .build(),
        checkout(None, None),
    ])
    .await?;

    let parent = h.engine.start_process("checkout", None, None).await?;
    let child_id = h.steps(&parent.id).await?[0].output_data[SUB_PROCESS_INSTANCE_KEY]
        .as_str()
        .unwrap()
        .to_string();

    h.engine.cancel_process(&child_id).await?;

    let parent = h.instance(&parent.id).await?;
    assert_status(&parent, ProcessStatus::Failed).unwrap();
    assert_eq!(
        parent.error_message,
        Some(format!("Sub-process cancelled: {}", child_id))
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_child_definition_fails_parent() -> Result<(), CoreError> {
    let h = TestHarness::new()?;
    h.deploy([checkout(None, None)]).await?;

    let parent = h.engine.start_process("checkout", None, None).await?;

    assert_status(&parent, ProcessStatus::Failed).unwrap();
    assert_eq!(
        parent.error_message.as_deref(),
        Some("Sub-process definition not found: shipping-quote")
    );
    Ok(())
}
