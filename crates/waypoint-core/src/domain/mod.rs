/// Process definitions and their steps
pub mod process_definition;

/// Runtime instances: processes, steps and tasks
pub mod process_instance;

/// Persistence traits
pub mod repository;

/// Outbound collaborator traits
pub mod services;

/// Engine lifecycle events
pub mod events;

/// JSON and YAML serialization of process definitions
pub mod serialization;
