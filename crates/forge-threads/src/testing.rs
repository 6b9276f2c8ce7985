use crate::{
    ChunkStream, RunInput, StreamChunk, StreamRunOptions, Thread, ThreadClient, ThreadClientError,
    ThreadStatus,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

pub type ChunkSender = mpsc::UnboundedSender<Result<StreamChunk, ThreadClientError>>;

/// In-memory `ThreadClient` with scripted runs and failure injection.
#[derive(Clone, Default)]
pub struct MockThreadClient {
    inner: Arc<Mutex<MockThreadState>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRun {
    pub thread_id: String,
    pub assistant_id: String,
    pub input: RunInput,
    pub options: StreamRunOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedStateUpdate {
    pub thread_id: String,
    pub values: Value,
    pub as_node: Option<String>,
}

enum ScriptedRun {
    Chunks(Vec<StreamChunk>),
    Channel(mpsc::UnboundedReceiver<Result<StreamChunk, ThreadClientError>>),
}

#[derive(Default)]
struct MockThreadState {
    next_thread_id: u64,
    threads: BTreeMap<String, Thread>,
    runs: VecDeque<ScriptedRun>,
    recorded_runs: Vec<RecordedRun>,
    state_updates: Vec<RecordedStateUpdate>,
    fail_next_run: Option<String>,
    fail_next_call: Option<String>,
}

impl MockThreadState {
    fn allocate_thread_id(&mut self) -> String {
        self.next_thread_id += 1;
        format!("thread-{}", self.next_thread_id)
    }

    fn take_call_failure(&mut self) -> Result<(), ThreadClientError> {
        match self.fail_next_call.take() {
            Some(reason) => Err(ThreadClientError::Backend(reason)),
            None => Ok(()),
        }
    }
}

impl MockThreadClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockThreadState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockThreadState>, ThreadClientError> {
        self.inner
            .lock()
            .map_err(|_| ThreadClientError::Backend("mock backend mutex poisoned".to_string()))
    }

    /// Queues the chunks the next `stream_run` yields.
    pub fn push_run(&self, chunks: Vec<StreamChunk>) {
        self.state().runs.push_back(ScriptedRun::Chunks(chunks));
    }

    /// Queues a run whose chunks are delivered through the returned sender.
    /// The run ends when the sender is dropped.
    pub fn push_channel_run(&self) -> ChunkSender {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state().runs.push_back(ScriptedRun::Channel(receiver));
        sender
    }

    pub fn fail_next_run(&self, reason: impl Into<String>) {
        self.state().fail_next_run = Some(reason.into());
    }

    /// Fails the next non-streaming call with a backend error.
    pub fn fail_next_call(&self, reason: impl Into<String>) {
        self.state().fail_next_call = Some(reason.into());
    }

    pub fn insert_thread(&self, thread: Thread) {
        self.state()
            .threads
            .insert(thread.thread_id.clone(), thread);
    }

    pub fn thread(&self, thread_id: &str) -> Option<Thread> {
        self.state().threads.get(thread_id).cloned()
    }

    pub fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.state().recorded_runs.clone()
    }

    pub fn state_updates(&self) -> Vec<RecordedStateUpdate> {
        self.state().state_updates.clone()
    }

    pub fn resolved_threads(&self) -> Vec<String> {
        self.state()
            .state_updates
            .iter()
            .filter(|update| update.as_node.as_deref() == Some("__end__"))
            .map(|update| update.thread_id.clone())
            .collect()
    }
}

#[async_trait]
impl ThreadClient for MockThreadClient {
    async fn create_thread(&self, metadata: Map<String, Value>) -> Result<Thread, ThreadClientError> {
        let mut state = self.lock()?;
        state.take_call_failure()?;
        let mut thread = Thread::new(state.allocate_thread_id());
        thread.metadata = metadata;
        state
            .threads
            .insert(thread.thread_id.clone(), thread.clone());
        Ok(thread)
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        input: RunInput,
        options: StreamRunOptions,
    ) -> Result<ChunkStream, ThreadClientError> {
        let mut state = self.lock()?;
        if let Some(reason) = state.fail_next_run.take() {
            return Err(ThreadClientError::Http(reason));
        }
        if !state.threads.contains_key(thread_id) {
            return Err(ThreadClientError::NotFound {
                resource: "thread",
                id: thread_id.to_string(),
            });
        }
        state.recorded_runs.push(RecordedRun {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
            input,
            options,
        });

        let next_run = state.runs.pop_front();
        match next_run {
            Some(ScriptedRun::Chunks(chunks)) => {
                let last_values = chunks
                    .iter()
                    .rev()
                    .find(|chunk| chunk.is_values())
                    .map(|chunk| chunk.data.clone());
                if let Some(thread) = state.threads.get_mut(thread_id) {
                    if let Some(values) = last_values {
                        thread.values = Some(values);
                    }
                }
                let items: Vec<Result<StreamChunk, ThreadClientError>> =
                    chunks.into_iter().map(Ok).collect();
                Ok(futures::stream::iter(items).boxed())
            }
            Some(ScriptedRun::Channel(receiver)) => {
                Ok(futures::stream::unfold(receiver, |mut receiver| async move {
                    receiver.recv().await.map(|item| (item, receiver))
                })
                .boxed())
            }
            None => Ok(futures::stream::empty().boxed()),
        }
    }

    async fn search_threads(
        &self,
        metadata: Map<String, Value>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Thread>, ThreadClientError> {
        let mut state = self.lock()?;
        state.take_call_failure()?;
        Ok(state
            .threads
            .values()
            .filter(|thread| {
                metadata
                    .iter()
                    .all(|(key, value)| thread.metadata.get(key) == Some(value))
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), ThreadClientError> {
        let mut state = self.lock()?;
        state.take_call_failure()?;
        state
            .threads
            .remove(thread_id)
            .map(|_| ())
            .ok_or_else(|| ThreadClientError::NotFound {
                resource: "thread",
                id: thread_id.to_string(),
            })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Thread, ThreadClientError> {
        let mut state = self.lock()?;
        state.take_call_failure()?;
        state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ThreadClientError::NotFound {
                resource: "thread",
                id: thread_id.to_string(),
            })
    }

    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<(), ThreadClientError> {
        let mut state = self.lock()?;
        state.take_call_failure()?;
        let Some(thread) = state.threads.get_mut(thread_id) else {
            return Err(ThreadClientError::NotFound {
                resource: "thread",
                id: thread_id.to_string(),
            });
        };
        if as_node == Some("__end__") {
            thread.interrupts = Value::Null;
            thread.status = ThreadStatus::Idle;
        }
        state.state_updates.push(RecordedStateUpdate {
            thread_id: thread_id.to_string(),
            values,
            as_node: as_node.map(str::to_string),
        });
        Ok(())
    }

    async fn check_status(&self) -> Result<(), ThreadClientError> {
        self.lock()?.take_call_failure()
    }
}
