//! Mock implementations of the collaborator traits.

use async_trait::async_trait;
use mockall::mock;
use waypoint_core::{
    CommandExecutor, CoreError, DomainEvent, DomainEventHandler, QueryExecutor, TaskService,
    Variables,
};

mock! {
    pub CommandExecutor {}

    #[async_trait]
    impl CommandExecutor for CommandExecutor {
        async fn execute(&self, command_name: &str, parameters: &Variables) -> anyhow::Result<Variables>;
    }
}

mock! {
    pub QueryExecutor {}

    #[async_trait]
    impl QueryExecutor for QueryExecutor {
        async fn execute(&self, query_name: &str, parameters: &Variables) -> anyhow::Result<Variables>;
    }
}

mock! {
    pub TaskService {}

    #[async_trait]
    impl TaskService for TaskService {
        async fn create_task(
            &self,
            process_instance_id: &str,
            step_instance_id: &str,
            task_type: &str,
            role: &str,
            data: &Variables,
        ) -> anyhow::Result<String>;
    }
}

mock! {
    pub EventHandler {}

    #[async_trait]
    impl DomainEventHandler for EventHandler {
        async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
    }
}
