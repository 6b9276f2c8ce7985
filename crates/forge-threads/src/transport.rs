use crate::{StreamSession, ThreadClient};
use async_trait::async_trait;
use forge_hitl::{HitlError, HumanInterrupt, HumanResponse, InterruptTransport};
use serde_json::Value;
use std::sync::Arc;

const END_NODE: &str = "__end__";

/// Delivers composer decisions to the agent server through the active thread.
#[derive(Clone)]
pub struct ThreadInterruptTransport {
    client: Arc<dyn ThreadClient>,
    stream: StreamSession,
}

impl ThreadInterruptTransport {
    pub fn new(client: Arc<dyn ThreadClient>, stream: StreamSession) -> Self {
        Self { client, stream }
    }

    fn active_thread(&self) -> Result<String, HitlError> {
        self.stream
            .thread_id()
            .ok_or_else(|| HitlError::transport("no active thread"))
    }
}

#[async_trait]
impl InterruptTransport for ThreadInterruptTransport {
    async fn send_response(
        &self,
        _interrupt: &HumanInterrupt,
        response: &HumanResponse,
    ) -> Result<(), HitlError> {
        self.active_thread()?;
        self.stream.resume(response).await?;
        Ok(())
    }

    /// Ends the thread without resuming the graph.
    async fn resolve_thread(&self) -> Result<(), HitlError> {
        let thread_id = self.active_thread()?;
        self.client
            .update_thread_state(&thread_id, Value::Null, Some(END_NODE))
            .await?;
        Ok(())
    }

    async fn ignore_thread(&self) -> Result<(), HitlError> {
        self.active_thread()?;
        self.stream.resume(&HumanResponse::ignore()).await?;
        Ok(())
    }
}
