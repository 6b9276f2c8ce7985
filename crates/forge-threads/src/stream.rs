//! Run stream consumption for one active thread.
//!
//! Every `values` chunk replaces the message state wholesale, so the latest
//! confirmed chunk always wins over optimistic values applied at submit time.
//! A run can be cancelled at any point with [`StreamSession::stop`]; chunks
//! that arrive after the cancellation point are discarded.

use crate::{
    Checkpoint, Message, RunInput, StreamRunOptions, StreamUpdate, Thread, ThreadClient,
    ThreadClientError, ThreadClientResult, UiMessage, assistant_metadata, reduce_ui,
};
use forge_hitl::HumanResponse;
use futures::StreamExt;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, watch};
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamState {
    pub thread_id: Option<String>,
    pub messages: Vec<Message>,
    pub ui: Vec<UiMessage>,
    pub context: Map<String, Value>,
    pub interrupt: Option<Value>,
    pub interrupt_ids: Vec<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl StreamState {
    fn apply_update(&mut self, update: StreamUpdate) {
        if let Some(mut messages) = update.messages {
            messages.iter_mut().for_each(Message::ensure_id);
            self.messages = messages;
        }
        if let Some(ui) = update.ui {
            self.ui = ui.into_iter().fold(Vec::new(), reduce_ui);
        }
        if let Some(context) = update.context {
            self.context = context;
        }
        self.interrupt = update.interrupt;
        self.interrupt_ids = update.interrupt_ids;
    }

    fn apply_values(&mut self, values: StreamValues) {
        self.messages = values.messages;
        if let Some(ui) = values.ui {
            self.ui = ui;
        }
        if let Some(context) = values.context {
            self.context = context;
        }
    }
}

/// Tentative values applied before the server confirms a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamValues {
    pub messages: Vec<Message>,
    pub ui: Option<Vec<UiMessage>>,
    pub context: Option<Map<String, Value>>,
}

type OptimisticValues = Box<dyn FnOnce(&StreamState) -> StreamValues + Send>;

#[derive(Default)]
pub struct SubmitOptions {
    pub run: StreamRunOptions,
    pub optimistic: Option<OptimisticValues>,
}

impl SubmitOptions {
    pub fn with_run(run: StreamRunOptions) -> Self {
        Self {
            run,
            optimistic: None,
        }
    }

    pub fn optimistic<F>(values: F) -> Self
    where
        F: FnOnce(&StreamState) -> StreamValues + Send + 'static,
    {
        Self {
            run: StreamRunOptions::default(),
            optimistic: Some(Box::new(values)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Cancelled,
}

struct RunAbort {
    requested: AtomicBool,
    notify: Notify,
}

impl RunAbort {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

struct StreamShared {
    client: Arc<dyn ThreadClient>,
    assistant_id: String,
    state: watch::Sender<StreamState>,
    active_run: Mutex<Option<Arc<RunAbort>>>,
}

impl StreamShared {
    fn active_run(&self) -> MutexGuard<'_, Option<Arc<RunAbort>>> {
        self.active_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_run(&self) -> Arc<RunAbort> {
        let run = Arc::new(RunAbort::new());
        if let Some(previous) = self.active_run().replace(Arc::clone(&run)) {
            previous.request();
        }
        run
    }

    fn stop(&self) {
        if let Some(run) = self.active_run().take() {
            run.request();
            debug!("stream run cancelled");
        }
        self.state.send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }

    fn finish_run(&self, run: &Arc<RunAbort>) {
        let mut active = self.active_run();
        if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, run)) {
            active.take();
            drop(active);
            self.state
                .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
        }
    }
}

/// Clears `loading` for a run on every exit path, including a dropped submit future.
struct RunGuard {
    shared: Arc<StreamShared>,
    run: Arc<RunAbort>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.finish_run(&self.run);
    }
}

#[derive(Clone)]
pub struct StreamAbortHandle {
    shared: Arc<StreamShared>,
}

impl StreamAbortHandle {
    pub fn request_abort(&self) {
        self.shared.stop();
    }
}

/// Session-scoped handle on one thread's streamed state. Clones share state.
#[derive(Clone)]
pub struct StreamSession {
    shared: Arc<StreamShared>,
}

impl StreamSession {
    pub fn new(client: Arc<dyn ThreadClient>, assistant_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(StreamState::default());
        Self {
            shared: Arc::new(StreamShared {
                client,
                assistant_id: assistant_id.into(),
                state,
                active_run: Mutex::new(None),
            }),
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.shared.assistant_id
    }

    pub fn snapshot(&self) -> StreamState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.shared.state.subscribe()
    }

    pub fn thread_id(&self) -> Option<String> {
        self.shared.state.borrow().thread_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    pub fn abort_handle(&self) -> StreamAbortHandle {
        StreamAbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stop(&self) {
        self.abort_handle().request_abort();
    }

    /// Streams one run to completion or cancellation. A run cancelled by
    /// [`stop`](Self::stop) resolves to `Ok(())`.
    pub async fn submit(&self, input: RunInput, options: SubmitOptions) -> ThreadClientResult<()> {
        self.run(input, options).await.map(|_| ())
    }

    async fn run(&self, input: RunInput, options: SubmitOptions) -> ThreadClientResult<RunOutcome> {
        let run = self.shared.begin_run();
        let _guard = RunGuard {
            shared: Arc::clone(&self.shared),
            run: Arc::clone(&run),
        };

        let optimistic = options.optimistic;
        self.shared.state.send_modify(|state| {
            if let Some(optimistic) = optimistic {
                let values = optimistic(state);
                state.apply_values(values);
            }
            state.loading = true;
            state.error = None;
        });

        match self.consume_run(&run, input, options.run).await {
            Ok(outcome) => Ok(outcome),
            Err(_) if run.is_requested() => Ok(RunOutcome::Cancelled),
            Err(error) => {
                warn!(%error, "stream run failed");
                self.shared
                    .state
                    .send_modify(|state| state.error = Some(error.to_string()));
                Err(error)
            }
        }
    }

    async fn consume_run(
        &self,
        run: &RunAbort,
        input: RunInput,
        options: StreamRunOptions,
    ) -> ThreadClientResult<RunOutcome> {
        let client = Arc::clone(&self.shared.client);
        let assistant_id = self.shared.assistant_id.as_str();

        let thread_id = match self.thread_id() {
            Some(thread_id) => thread_id,
            None => {
                let thread = tokio::select! {
                    biased;
                    _ = run.cancelled() => return Ok(RunOutcome::Cancelled),
                    thread = client.create_thread(assistant_metadata(assistant_id)) => thread?,
                };
                debug!(thread_id = %thread.thread_id, "thread created for run");
                self.shared
                    .state
                    .send_modify(|state| state.thread_id = Some(thread.thread_id.clone()));
                thread.thread_id
            }
        };

        let mut chunks = tokio::select! {
            biased;
            _ = run.cancelled() => return Ok(RunOutcome::Cancelled),
            chunks = client.stream_run(&thread_id, assistant_id, input, options) => chunks?,
        };
        debug!(%thread_id, "stream run started");

        loop {
            let next = tokio::select! {
                biased;
                _ = run.cancelled() => return Ok(RunOutcome::Cancelled),
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                if run.is_requested() {
                    return Ok(RunOutcome::Cancelled);
                }
                debug!(%thread_id, "stream run finished");
                return Ok(RunOutcome::Completed);
            };
            let chunk = chunk?;
            if !chunk.is_values() {
                continue;
            }
            let update = StreamUpdate::from_value(&chunk.data);
            self.shared.state.send_if_modified(|state| {
                if run.is_requested() {
                    return false;
                }
                state.apply_update(update);
                true
            });
        }
    }

    /// Sends a human message on the active thread, creating one if needed.
    /// Returns `false` without sending for blank text or while a run is in flight.
    pub async fn send_message(&self, text: impl Into<String>) -> ThreadClientResult<bool> {
        let text = text.into();
        if text.trim().is_empty() || self.is_loading() {
            return Ok(false);
        }

        let message = Message::human(text);
        let context = Some(self.snapshot().context).filter(|context| !context.is_empty());
        let input = RunInput::messages(std::slice::from_ref(&message), context.as_ref());
        let options = SubmitOptions::optimistic(move |state| {
            let mut messages = state.messages.clone();
            messages.push(message);
            StreamValues {
                messages,
                ui: None,
                context: None,
            }
        });
        self.submit(input, options).await?;
        Ok(true)
    }

    /// Resumes the interrupted run on the active thread with one human response.
    ///
    /// Unlike [`submit`](Self::submit), a run stopped before it finished fails
    /// with [`ThreadClientError::Cancelled`]: the server never confirmed the
    /// response and the interrupt is still pending.
    pub async fn resume(&self, response: &HumanResponse) -> ThreadClientResult<()> {
        if self.thread_id().is_none() {
            return Err(ThreadClientError::InvalidInput(
                "no active thread to resume".to_string(),
            ));
        }
        match self
            .run(RunInput::resume(json!([response])), SubmitOptions::default())
            .await?
        {
            RunOutcome::Completed => Ok(()),
            RunOutcome::Cancelled => {
                debug!("resume run cancelled before completion");
                Err(ThreadClientError::Cancelled)
            }
        }
    }

    /// Re-runs the thread from `checkpoint` without new input.
    pub async fn regenerate(&self, checkpoint: Checkpoint) -> ThreadClientResult<()> {
        self.submit(
            RunInput::default(),
            SubmitOptions::with_run(StreamRunOptions::from_checkpoint(checkpoint)),
        )
        .await
    }

    /// Cancels any run and drops all thread state.
    pub fn reset(&self) {
        self.stop();
        self.shared.state.send_replace(StreamState::default());
    }

    /// Points the session at another thread, discarding the current one's state.
    pub fn set_thread_id(&self, thread_id: Option<String>) {
        if self.thread_id() == thread_id {
            return;
        }
        self.reset();
        self.shared
            .state
            .send_modify(|state| state.thread_id = thread_id);
    }

    /// Rebuilds message, context and interrupt state from a stored thread.
    pub fn load_thread(&self, thread: &Thread) {
        self.stop();
        let mut state = StreamState {
            thread_id: Some(thread.thread_id.clone()),
            ..StreamState::default()
        };
        if let Some(values) = &thread.values {
            state.apply_update(StreamUpdate::from_value(values));
        }
        if let Some(interrupt) = thread.interrupt_value() {
            state.interrupt = Some(interrupt);
            state.interrupt_ids = thread.interrupt_ids();
        }
        self.shared.state.send_replace(state);
    }
}
