//! The default handler registry `queue:work` dispatches to out of the
//! box: an example handler demonstrating the shape a real deployment's
//! handlers would follow.

use async_trait::async_trait;
use queue_core::{HandlerRegistry, JobHandler};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProcessExample {
    pub data: String,
}

#[async_trait]
impl JobHandler for ProcessExample {
    async fn handle(&mut self) -> anyhow::Result<()> {
        tracing::info!(data = %self.data, "ProcessExample handling job");
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        Ok(())
    }
}

/// Builds the registry every `queue-cli` invocation starts from. A real
/// deployment would register its own handlers alongside this one.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register::<ProcessExample>("ProcessExample");
    registry
}
