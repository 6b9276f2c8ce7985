use crate::{RunInput, StreamChunk, StreamRunOptions, Thread, ThreadClientError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ThreadClientError>>;

/// Remote agent server surface used by the chat session.
#[async_trait]
pub trait ThreadClient: Send + Sync {
    async fn create_thread(&self, metadata: Map<String, Value>) -> Result<Thread, ThreadClientError>;

    /// Starts a run on `thread_id` and yields its events in arrival order.
    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        input: RunInput,
        options: StreamRunOptions,
    ) -> Result<ChunkStream, ThreadClientError>;

    async fn search_threads(
        &self,
        metadata: Map<String, Value>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>, ThreadClientError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<(), ThreadClientError>;

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadClientError>;

    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<(), ThreadClientError>;

    /// Cheap reachability probe.
    async fn check_status(&self) -> Result<(), ThreadClientError>;
}
