/// Process execution engine
pub mod process_engine;

/// Background resumption of due scheduled steps
pub mod schedule_sweeper;

pub use process_engine::ProcessEngine;
pub use schedule_sweeper::{ScheduleSweeper, SweeperConfig};
