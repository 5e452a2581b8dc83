//! Assertion utilities for process instances.

use thiserror::Error;
use waypoint_core::{ProcessInstance, ProcessStatus, Value};

/// Error type for instance assertion failures
#[derive(Debug, Error, PartialEq)]
pub enum InstanceAssertionError {
    /// Status differs
    #[error("Invalid process status: expected {expected:?}, got {actual:?} (error: {error:?})")]
    InvalidStatus {
        /// Expected status
        expected: ProcessStatus,
        /// Actual status
        actual: ProcessStatus,
        /// Error message recorded on the instance
        error: Option<String>,
    },

    /// Variable is absent
    #[error("Missing variable: {0}")]
    MissingVariable(String),

    /// Variable has another value
    #[error("Invalid value for {key}: expected {expected:?}, got {actual:?}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Expected value
        expected: Value,
        /// Actual value
        actual: Value,
    },
}

/// Check that `instance` has `expected` status
pub fn assert_status(
    instance: &ProcessInstance,
    expected: ProcessStatus,
) -> Result<(), InstanceAssertionError> {
    if instance.status != expected {
        return Err(InstanceAssertionError::InvalidStatus {
            expected,
            actual: instance.status,
            error: instance.error_message.clone(),
        });
    }
    Ok(())
}

/// Check that `instance` holds `key` with value `expected`
pub fn assert_variable(
    instance: &ProcessInstance,
    key: &str,
    expected: impl Into<Value>,
) -> Result<(), InstanceAssertionError> {
    let expected = expected.into();
    let actual = instance
        .variables
        .get(key)
        .ok_or_else(|| InstanceAssertionError::MissingVariable(key.to_string()))?;
    if *actual != expected {
        return Err(InstanceAssertionError::InvalidValue {
            key: key.to_string(),
            expected,
            actual: actual.clone(),
        });
    }
    Ok(())
}
