use crate::SubmitType;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitlEvent {
    pub sequence_no: u64,
    pub kind: HitlEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitlEventKind {
    InterruptLoaded {
        action: String,
        draft_types: Vec<SubmitType>,
    },
    UnstructuredInterrupt,
    Cleared,
    SubmitStarted {
        submit_type: SubmitType,
    },
    Submitted {
        submit_type: SubmitType,
    },
    SubmitRejected {
        reason: String,
    },
    SubmitFailed {
        submit_type: SubmitType,
        reason: String,
    },
    SubmitCancelled {
        submit_type: SubmitType,
    },
    ThreadResolved,
    ThreadIgnored,
    ThreadActionFailed {
        action: String,
        reason: String,
    },
}

pub trait HitlEventObserver: Send + Sync {
    fn on_event(&self, event: &HitlEvent);
}

impl<F> HitlEventObserver for F
where
    F: Fn(&HitlEvent) + Send + Sync,
{
    fn on_event(&self, event: &HitlEvent) {
        self(event);
    }
}

pub type SharedHitlEventObserver = Arc<dyn HitlEventObserver>;
pub type HitlEventSender = mpsc::UnboundedSender<HitlEvent>;
pub type HitlEventReceiver = mpsc::UnboundedReceiver<HitlEvent>;

#[derive(Clone, Default)]
pub struct HitlEventSink {
    observer: Option<SharedHitlEventObserver>,
    sender: Option<HitlEventSender>,
}

impl HitlEventSink {
    pub fn with_observer(observer: SharedHitlEventObserver) -> Self {
        Self {
            observer: Some(observer),
            sender: None,
        }
    }

    pub fn with_sender(sender: HitlEventSender) -> Self {
        Self {
            observer: None,
            sender: Some(sender),
        }
    }

    pub fn observer(mut self, observer: SharedHitlEventObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn sender(mut self, sender: HitlEventSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some() || self.sender.is_some()
    }

    pub fn emit(&self, event: HitlEvent) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_event(&event);
        }
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(event);
        }
    }
}

pub fn hitl_event_channel() -> (HitlEventSender, HitlEventReceiver) {
    mpsc::unbounded_channel()
}
