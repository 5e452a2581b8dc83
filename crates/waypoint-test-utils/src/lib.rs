//! Testing utilities for the Waypoint engine.
//!
//! This crate provides mocks of the collaborator traits, fakes that record
//! what the engine asked of them, a definition builder, a harness wiring an
//! engine over the in-memory store, and instance assertions.

pub mod assertions;
pub mod builders;
pub mod harness;
pub mod implementations;
pub mod mocks;
pub mod util;

/// Re-export commonly used types for convenience
pub use mockall;

pub use assertions::{assert_status, assert_variable, InstanceAssertionError};
pub use builders::DefinitionBuilder;
pub use harness::TestHarness;
pub use implementations::{
    RecordingCommandExecutor, RecordingEventHandler, ScriptedQueryExecutor, SequentialTaskService,
};
pub use util::{eventually, init_test_tracing};
