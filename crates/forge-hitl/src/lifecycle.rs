use crate::{
    HitlError, HitlEvent, HitlEventKind, HitlEventSink, HumanInterrupt, HumanResponse,
    InterruptValue, ResponseDraft, ResponseDraftStore, SubmitType, classify, resolve,
    submit_label,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Busy flags shown by the presentation layer. They are independent of each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFlags {
    pub loading: bool,
    pub streaming: bool,
    pub finished: bool,
}

impl ActionFlags {
    pub fn is_busy(&self) -> bool {
        self.loading || self.streaming
    }
}

/// Remote side of the interrupt: where answers and thread actions go.
#[async_trait]
pub trait InterruptTransport: Send + Sync {
    async fn send_response(
        &self,
        interrupt: &HumanInterrupt,
        response: &HumanResponse,
    ) -> Result<(), HitlError>;

    async fn resolve_thread(&self) -> Result<(), HitlError>;

    async fn ignore_thread(&self) -> Result<(), HitlError>;
}

/// Sets busy flags on creation and clears them when dropped, so every exit
/// path (early return, error, cancelled future) restores them.
struct BusyGuard {
    flags: Arc<watch::Sender<ActionFlags>>,
    streaming: bool,
}

impl BusyGuard {
    fn enter(flags: Arc<watch::Sender<ActionFlags>>, streaming: bool) -> Self {
        flags.send_modify(|state| {
            state.loading = true;
            if streaming {
                state.streaming = true;
            }
        });
        Self { flags, streaming }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let streaming = self.streaming;
        self.flags.send_modify(|state| {
            state.loading = false;
            if streaming {
                state.streaming = false;
            }
        });
    }
}

/// Owns the drafts and flags for the interrupt of one active thread.
///
/// The controller does no locking between `submit`, `resolve_thread` and
/// `ignore_thread`; callers trigger one at a time and watch [`ActionFlags`].
pub struct InterruptController {
    transport: Arc<dyn InterruptTransport>,
    store: ResponseDraftStore,
    interrupt: Option<HumanInterrupt>,
    selected_submit_type: Option<SubmitType>,
    flags: Arc<watch::Sender<ActionFlags>>,
    events: HitlEventSink,
    sequence_no: u64,
}

impl InterruptController {
    pub fn new(transport: Arc<dyn InterruptTransport>) -> Self {
        Self::with_events(transport, HitlEventSink::default())
    }

    pub fn with_events(transport: Arc<dyn InterruptTransport>, events: HitlEventSink) -> Self {
        let (flags, _) = watch::channel(ActionFlags::default());
        Self {
            transport,
            store: ResponseDraftStore::new(),
            interrupt: None,
            selected_submit_type: None,
            flags: Arc::new(flags),
            events,
            sequence_no: 0,
        }
    }

    /// Classifies `value` and seeds drafts when it is a human interrupt.
    pub fn load(&mut self, value: &Value) -> InterruptValue {
        let classified = classify(value);
        match &classified {
            InterruptValue::Structured(interrupt) => self.initialize(interrupt.clone()),
            InterruptValue::Unstructured(_) => {
                self.clear();
                self.emit(HitlEventKind::UnstructuredInterrupt);
            }
        }
        classified
    }

    pub fn initialize(&mut self, interrupt: HumanInterrupt) {
        self.clear();
        self.store.initialize(&interrupt);
        let draft_types = self
            .store
            .drafts()
            .iter()
            .map(ResponseDraft::submit_type)
            .collect();
        self.emit(HitlEventKind::InterruptLoaded {
            action: interrupt.action_request.action.clone(),
            draft_types,
        });
        self.interrupt = Some(interrupt);
    }

    /// Drops the interrupt, its drafts and the finished marker.
    pub fn clear(&mut self) {
        self.store.clear();
        self.interrupt = None;
        self.selected_submit_type = None;
        self.flags.send_modify(|state| state.finished = false);
        self.emit(HitlEventKind::Cleared);
    }

    /// Like [`clear`](Self::clear) but also forces every flag back to false.
    pub fn reset(&mut self) {
        self.clear();
        self.flags.send_replace(ActionFlags::default());
    }

    /// Resolves and sends one response. `finished` is set only once the
    /// transport confirms it; any error leaves the drafts as they were.
    pub async fn submit(&mut self) -> Result<HumanResponse, HitlError> {
        let busy = BusyGuard::enter(Arc::clone(&self.flags), true);
        let outcome = self.submit_resolved().await;
        drop(busy);

        match &outcome {
            Ok(response) => self.emit(HitlEventKind::Submitted {
                submit_type: response.kind,
            }),
            Err(HitlError::Transport(reason)) => {
                warn!(error = %reason, "failed to submit interrupt response");
                if let Some(submit_type) = self.selected_submit_type {
                    self.emit(HitlEventKind::SubmitFailed {
                        submit_type,
                        reason: reason.clone(),
                    });
                }
            }
            Err(HitlError::Cancelled) => {
                debug!("interrupt submission cancelled");
                if let Some(submit_type) = self.selected_submit_type {
                    self.emit(HitlEventKind::SubmitCancelled { submit_type });
                }
            }
            Err(error) => {
                debug!(%error, "interrupt submission rejected locally");
                self.emit(HitlEventKind::SubmitRejected {
                    reason: error.to_string(),
                });
            }
        }
        outcome
    }

    async fn submit_resolved(&mut self) -> Result<HumanResponse, HitlError> {
        let interrupt = self.interrupt.clone().ok_or(HitlError::NoActiveInterrupt)?;
        let response = resolve(&self.store)?;
        self.selected_submit_type = Some(response.kind);
        self.emit(HitlEventKind::SubmitStarted {
            submit_type: response.kind,
        });
        debug!(submit_type = %response.kind, action = %interrupt.action_request.action, "submitting interrupt response");

        self.transport.send_response(&interrupt, &response).await?;
        self.flags.send_modify(|state| state.finished = true);
        Ok(response)
    }

    pub async fn resolve_thread(&mut self) -> Result<(), HitlError> {
        let busy = BusyGuard::enter(Arc::clone(&self.flags), false);
        let outcome = self.transport.resolve_thread().await;
        drop(busy);
        self.finish_thread_action("resolve", outcome, HitlEventKind::ThreadResolved)
    }

    pub async fn ignore_thread(&mut self) -> Result<(), HitlError> {
        if let Some(interrupt) = &self.interrupt {
            if !interrupt.config.allow_ignore {
                return Err(HitlError::NotAllowed("ignore".to_string()));
            }
        }
        let busy = BusyGuard::enter(Arc::clone(&self.flags), false);
        let outcome = self.transport.ignore_thread().await;
        drop(busy);
        self.finish_thread_action("ignore", outcome, HitlEventKind::ThreadIgnored)
    }

    fn finish_thread_action(
        &mut self,
        action: &str,
        outcome: Result<(), HitlError>,
        success: HitlEventKind,
    ) -> Result<(), HitlError> {
        match &outcome {
            Ok(()) => self.emit(success),
            Err(error) => {
                warn!(%error, action, "thread action failed");
                self.emit(HitlEventKind::ThreadActionFailed {
                    action: action.to_string(),
                    reason: error.to_string(),
                });
            }
        }
        outcome
    }

    pub fn drafts(&self) -> &ResponseDraftStore {
        &self.store
    }

    pub fn drafts_mut(&mut self) -> &mut ResponseDraftStore {
        &mut self.store
    }

    pub fn current_interrupt(&self) -> Option<&HumanInterrupt> {
        self.interrupt.as_ref()
    }

    pub fn selected_submit_type(&self) -> Option<SubmitType> {
        self.selected_submit_type
    }

    /// What `submit` would send right now, without touching any state.
    pub fn preview(&self) -> Result<HumanResponse, HitlError> {
        if self.interrupt.is_none() {
            return Err(HitlError::NoActiveInterrupt);
        }
        resolve(&self.store)
    }

    pub fn submit_label(&self) -> &'static str {
        submit_label(&self.store)
    }

    pub fn flags(&self) -> ActionFlags {
        *self.flags.borrow()
    }

    pub fn subscribe_flags(&self) -> watch::Receiver<ActionFlags> {
        self.flags.subscribe()
    }

    fn emit(&mut self, kind: HitlEventKind) {
        if !self.events.is_enabled() {
            return;
        }
        self.sequence_no += 1;
        self.events.emit(HitlEvent {
            sequence_no: self.sequence_no,
            kind,
        });
    }
}
