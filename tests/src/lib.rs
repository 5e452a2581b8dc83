//! Shared fixtures for the Waypoint end-to-end scenarios.
//!
//! The scenarios themselves live under `tests/` and run the engine against
//! the in-memory store through [`TestHarness`].

use waypoint_core::{ProcessDefinition, ScheduledStep, SubProcessStep, Value, Variables};
use waypoint_test_utils::DefinitionBuilder;

pub use waypoint_test_utils::TestHarness;

/// Reserve stock, route on risk, optionally get a manager's approval, ship.
pub fn order_fulfilment() -> ProcessDefinition {
    DefinitionBuilder::new("order-fulfilment")
        .name("Order fulfilment")
        .business("reserve", "ReserveStock", Some("assess"))
        .decision(
            "assess",
            "OrderRisk",
            &[("review", "riskScore > 70", 1), ("ship", "", 10)],
        )
        .interactive("review", "ApproveOrder", "manager", Some("ship"))
        .business("ship", "ShipOrder", None)
        .build()
}

/// Wait for `PaymentReceived`, then capture the payment.
pub fn awaiting_payment(timeout_minutes: Option<i64>) -> ProcessDefinition {
    DefinitionBuilder::new("awaiting-payment")
        .signal("await-payment", "PaymentReceived", timeout_minutes, Some("capture"))
        .business("capture", "CapturePayment", None)
        .build()
}

/// Wait until `schedule_expression`, then send a reminder.
pub fn reminder(schedule_expression: &str) -> ProcessDefinition {
    DefinitionBuilder::new("reminder")
        .scheduled(
            "cool-off",
            ScheduledStep {
                schedule_expression: Some(schedule_expression.to_string()),
                ..Default::default()
            },
            Some("remind"),
        )
        .business("remind", "SendReminder", None)
        .build()
}

/// Child process computing a shipping quote.
pub fn shipping_quote() -> ProcessDefinition {
    DefinitionBuilder::new("shipping-quote")
        .business("quote", "QuoteShipping", None)
        .build()
}

/// Parent process delegating the quote to [`shipping_quote`].
pub fn checkout(input_mapping: Option<Variables>, output_mapping: Option<Variables>) -> ProcessDefinition {
    DefinitionBuilder::new("checkout")
        .sub_process(
            "get-quote",
            SubProcessStep {
                sub_process_id: "shipping-quote".to_string(),
                sub_process_version: None,
                input_mapping,
                output_mapping,
            },
            Some("confirm"),
        )
        .business("confirm", "ConfirmCheckout", None)
        .build()
}

/// String value shorthand
pub fn text(value: &str) -> Value {
    Value::String(value.to_string())
}
