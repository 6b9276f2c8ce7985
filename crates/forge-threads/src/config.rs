use crate::{Checkpoint, ThreadClientError, ThreadClientResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://localhost:2024";
pub const DEFAULT_ASSISTANT_ID: &str = "agent";
const STUDIO_THREAD_URL: &str = "https://smith.langchain.com/studio/thread";

/// Connection settings for one agent server. The only state persisted locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub api_url: String,
    pub assistant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            api_key: None,
        }
    }
}

impl ConnectionConfig {
    pub fn new(
        api_url: impl Into<String>,
        assistant_id: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            assistant_id: assistant_id.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    /// Defaults overridden by `FORGE_API_URL`, `FORGE_ASSISTANT_ID` and `FORGE_API_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::new(
            std::env::var("FORGE_API_URL").unwrap_or(defaults.api_url),
            std::env::var("FORGE_ASSISTANT_ID").unwrap_or(defaults.assistant_id),
            std::env::var("FORGE_API_KEY").ok(),
        )
    }

    pub fn load(path: &Path) -> ThreadClientResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|error| {
            ThreadClientError::Decode(format!("settings {}: {error}", path.display()))
        })?;
        config.validate()?;
        Ok(Self::new(config.api_url, config.assistant_id, config.api_key))
    }

    pub fn save(&self, path: &Path) -> ThreadClientResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|error| ThreadClientError::Decode(error.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> ThreadClientResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(ThreadClientError::NotConfigured(
                "api_url is empty".to_string(),
            ));
        }
        if self.assistant_id.trim().is_empty() {
            return Err(ThreadClientError::NotConfigured(
                "assistant_id is empty".to_string(),
            ));
        }
        reqwest::Url::parse(&self.api_url).map_err(|error| {
            ThreadClientError::InvalidInput(format!("api_url {:?}: {error}", self.api_url))
        })?;
        Ok(())
    }
}

/// `FORGE_CHAT_SETTINGS`, else `$HOME/.config/forge/chat.json`.
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("FORGE_CHAT_SETTINGS") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("forge")
        .join("chat.json")
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamRunOptions {
    pub checkpoint: Option<Checkpoint>,
    pub stream_mode: Vec<String>,
}

impl Default for StreamRunOptions {
    fn default() -> Self {
        Self {
            checkpoint: None,
            stream_mode: vec!["values".to_string()],
        }
    }
}

impl StreamRunOptions {
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint: Some(checkpoint),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadListConfig {
    pub limit: usize,
    pub offset: usize,
}

impl Default for ThreadListConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Thread metadata identifying an assistant: UUIDs are assistant ids, anything
/// else is a graph id.
pub fn assistant_metadata(assistant_id: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    if assistant_id.is_empty() {
        return metadata;
    }
    let key = if is_assistant_uuid(assistant_id) {
        "assistant_id"
    } else {
        "graph_id"
    };
    metadata.insert(key.to_string(), Value::String(assistant_id.to_string()));
    metadata
}

fn is_assistant_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (index, byte) in bytes.iter().enumerate() {
        let dash = matches!(index, 8 | 13 | 18 | 23);
        if dash != (*byte == b'-') {
            return false;
        }
        if !dash && !byte.is_ascii_hexdigit() {
            return false;
        }
    }
    matches!(bytes[14], b'1'..=b'5') && matches!(bytes[19].to_ascii_lowercase(), b'8' | b'9' | b'a' | b'b')
}

/// Deep link into LangGraph Studio for an optional thread.
pub fn studio_url(api_url: &str, thread_id: Option<&str>) -> ThreadClientResult<String> {
    let base = match thread_id {
        Some(thread_id) => format!("{STUDIO_THREAD_URL}/{thread_id}"),
        None => STUDIO_THREAD_URL.to_string(),
    };
    let mut url = reqwest::Url::parse(&base)
        .map_err(|error| ThreadClientError::InvalidInput(error.to_string()))?;
    url.query_pairs_mut()
        .append_pair("baseUrl", api_url.trim_end_matches('/'));
    Ok(url.to_string())
}
