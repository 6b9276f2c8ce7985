use crate::{
    ConnectionConfig, HttpThreadClient, StreamSession, StreamState, Thread, ThreadClient,
    ThreadClientResult, ThreadDirectory, ThreadInterruptTransport, studio_url,
};
use forge_hitl::{
    HitlError, HitlEventSink, HumanResponse, InterruptController, InterruptValue, classify,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Identity of the interrupt currently loaded into the composer.
#[derive(Clone, Debug, PartialEq)]
struct PendingInterrupt {
    ids: Vec<String>,
    value: Value,
}

/// One connection's chat state: the active thread's stream, the thread list
/// and the interrupt composer bound to that thread.
pub struct ChatSession {
    config: ConnectionConfig,
    client: Arc<dyn ThreadClient>,
    stream: StreamSession,
    directory: ThreadDirectory,
    interrupts: InterruptController,
    loaded_interrupt: Option<PendingInterrupt>,
}

impl ChatSession {
    pub fn new(config: ConnectionConfig, client: Arc<dyn ThreadClient>) -> Self {
        Self::with_events(config, client, HitlEventSink::default())
    }

    pub fn with_events(
        config: ConnectionConfig,
        client: Arc<dyn ThreadClient>,
        events: HitlEventSink,
    ) -> Self {
        let stream = StreamSession::new(Arc::clone(&client), config.assistant_id.clone());
        let transport = ThreadInterruptTransport::new(Arc::clone(&client), stream.clone());
        Self {
            directory: ThreadDirectory::new(Arc::clone(&client)),
            interrupts: InterruptController::with_events(Arc::new(transport), events),
            config,
            client,
            stream,
            loaded_interrupt: None,
        }
    }

    pub fn connect(config: ConnectionConfig) -> ThreadClientResult<Self> {
        let client = HttpThreadClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stream(&self) -> &StreamSession {
        &self.stream
    }

    pub fn directory(&self) -> &ThreadDirectory {
        &self.directory
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    pub fn snapshot(&self) -> StreamState {
        self.stream.snapshot()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.stream.thread_id()
    }

    pub async fn check_status(&self) -> ThreadClientResult<()> {
        self.client.check_status().await
    }

    pub async fn send_message(&mut self, text: impl Into<String>) -> ThreadClientResult<bool> {
        let sent = self.stream.send_message(text).await;
        self.sync_interrupt();
        sent
    }

    pub fn stop(&self) {
        self.stream.stop();
    }

    /// Detaches from the current thread; the next message starts a new one.
    pub fn new_thread(&mut self) {
        self.interrupts.reset();
        self.loaded_interrupt = None;
        self.stream.reset();
    }

    /// Switches to a stored thread. Drafts and message state are dropped before
    /// the new thread is fetched.
    pub async fn select_thread(&mut self, thread_id: &str) -> ThreadClientResult<Thread> {
        self.new_thread();
        let thread = self.client.get_thread(thread_id).await?;
        self.stream.load_thread(&thread);
        self.sync_interrupt();
        debug!(thread_id, "thread selected");
        Ok(thread)
    }

    /// Loads the stream's pending interrupt into the composer when it is new.
    ///
    /// An interrupt counts as new when its ids or payload differ from the
    /// loaded one, or when the loaded one was already answered: a confirmed
    /// resume consumes it, so anything still pending was issued afterwards.
    /// A vanished interrupt clears the composer unless its response was already
    /// submitted, so the finished state stays visible.
    pub fn sync_interrupt(&mut self) -> Option<InterruptValue> {
        let state = self.stream.snapshot();
        match state.interrupt {
            Some(value) => {
                let pending = PendingInterrupt {
                    ids: state.interrupt_ids,
                    value,
                };
                if self.loaded_interrupt.as_ref() == Some(&pending)
                    && !self.interrupts.flags().finished
                {
                    return Some(classify(&pending.value));
                }
                let classified = self.interrupts.load(&pending.value);
                self.loaded_interrupt = Some(pending);
                Some(classified)
            }
            None => {
                if self.loaded_interrupt.take().is_some() && !self.interrupts.flags().finished {
                    self.interrupts.clear();
                }
                None
            }
        }
    }

    pub async fn submit_interrupt(&mut self) -> Result<HumanResponse, HitlError> {
        let outcome = self.interrupts.submit().await;
        self.sync_interrupt();
        outcome
    }

    pub async fn resolve_thread(&mut self) -> Result<(), HitlError> {
        self.interrupts.resolve_thread().await?;
        if let Some(thread_id) = self.thread_id() {
            let thread = self.client.get_thread(&thread_id).await?;
            self.stream.load_thread(&thread);
        }
        self.sync_interrupt();
        Ok(())
    }

    pub async fn ignore_thread(&mut self) -> Result<(), HitlError> {
        let outcome = self.interrupts.ignore_thread().await;
        if outcome.is_ok() {
            // The ignored interrupt is consumed; anything pending now is new.
            self.interrupts.clear();
            self.loaded_interrupt = None;
        }
        self.sync_interrupt();
        outcome
    }

    pub async fn list_threads(&self) -> Vec<Thread> {
        self.directory.refresh(&self.config.assistant_id).await
    }

    pub async fn delete_thread(&mut self, thread_id: &str) -> ThreadClientResult<()> {
        self.directory
            .delete_thread(&self.config.assistant_id, thread_id)
            .await?;
        if self.thread_id().as_deref() == Some(thread_id) {
            self.new_thread();
        }
        Ok(())
    }

    pub fn studio_url(&self) -> ThreadClientResult<String> {
        studio_url(&self.config.api_url, self.thread_id().as_deref())
    }
}
