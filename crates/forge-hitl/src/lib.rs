//! Human-interrupt response composer for Forge chat clients.
//!
//! A paused agent run surfaces an interrupt payload. This crate turns it into
//! a structured request, keeps the user's candidate responses, picks exactly one
//! response to submit and tracks the busy flags around the remote call:
//! classify -> initialize drafts -> edit -> resolve -> submit.

pub mod classify;
pub mod display;
pub mod drafts;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod resolve;
pub mod types;

pub use classify::*;
pub use display::*;
pub use drafts::*;
pub use errors::*;
pub use events::*;
pub use lifecycle::*;
pub use resolve::*;
pub use types::*;
