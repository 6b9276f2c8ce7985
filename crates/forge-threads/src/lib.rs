//! Remote thread plumbing for Forge chat clients.
//!
//! `ThreadClient` is the seam to the agent server (thread CRUD and streamed
//! runs). `StreamSession` consumes run streams into message state,
//! `ThreadDirectory` caches the thread list and `ChatSession` ties one
//! connection's stream state to the interrupt composer from `forge-hitl`.

pub mod chat;
pub mod client;
pub mod config;
pub mod directory;
pub mod errors;
pub mod http;
pub mod sse;
pub mod stream;
pub mod testing;
pub mod transport;
pub mod types;

pub use chat::ChatSession;
pub use client::{ChunkStream, ThreadClient};
pub use config::{
    ConnectionConfig, DEFAULT_API_URL, DEFAULT_ASSISTANT_ID, StreamRunOptions, ThreadListConfig,
    assistant_metadata, default_settings_path, studio_url,
};
pub use directory::ThreadDirectory;
pub use errors::{ThreadClientError, ThreadClientResult};
pub use http::HttpThreadClient;
pub use stream::{StreamAbortHandle, StreamSession, StreamState, StreamValues, SubmitOptions};
pub use testing::MockThreadClient;
pub use transport::ThreadInterruptTransport;
pub use types::*;
