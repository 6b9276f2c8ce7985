use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Ai,
    Tool,
    System,
    #[serde(other)]
    Other,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::Tool => "tool",
            Self::System => "system",
            Self::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Human => "User",
            Self::Ai => "Assistant",
            Self::Tool => "Tool",
            Self::System => "System",
            Self::Other => "Unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: MessageType::Human,
            content: Value::String(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// String content as-is, or the `text` blocks of block content joined by newlines.
    pub fn text_content(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .map(|block| block.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }

    pub(crate) fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = format!("{}-{}", self.kind.as_str(), Uuid::new_v4());
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Idle,
    Busy,
    Interrupted,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    /// Pending interrupts keyed by task id.
    #[serde(default)]
    pub interrupts: Value,
}

impl Thread {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            created_at: None,
            updated_at: None,
            metadata: Map::new(),
            status: ThreadStatus::Idle,
            values: None,
            interrupts: Value::Null,
        }
    }

    /// Interrupt payloads across all tasks, unwrapped from their `{"value": ...}` envelopes.
    pub fn interrupt_value(&self) -> Option<Value> {
        let values: Vec<Value> = self
            .interrupts
            .as_object()
            .into_iter()
            .flat_map(|tasks| tasks.values())
            .filter_map(Value::as_array)
            .flatten()
            .map(unwrap_interrupt)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(Value::Array(values))
        }
    }

    /// Ids of the pending interrupts, in the same order as [`interrupt_value`](Self::interrupt_value).
    pub fn interrupt_ids(&self) -> Vec<String> {
        self.interrupts
            .as_object()
            .into_iter()
            .flat_map(|tasks| tasks.values())
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(interrupt_id)
            .collect()
    }

    /// Short label for thread lists: first human message text, else the thread id.
    pub fn preview(&self) -> String {
        self.values
            .as_ref()
            .and_then(|values| values.get("messages"))
            .and_then(Value::as_array)
            .and_then(|messages| {
                messages.iter().find_map(|raw| {
                    let message: Message = serde_json::from_value(raw.clone()).ok()?;
                    (message.kind == MessageType::Human).then(|| message.text_content())
                })
            })
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.thread_id.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: String,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// One server-sent event of a streamed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl StreamChunk {
    pub fn values(data: Value) -> Self {
        Self {
            event: "values".to_string(),
            data,
        }
    }

    pub fn is_values(&self) -> bool {
        self.event == "values"
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    #[serde(default, flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiUpdate {
    #[serde(rename = "ui")]
    Upsert(UiMessage),
    #[serde(rename = "remove-ui")]
    Remove { id: String },
}

/// Applies one UI update: upsert by id, or remove by id.
pub fn reduce_ui(mut current: Vec<UiMessage>, update: UiUpdate) -> Vec<UiMessage> {
    match update {
        UiUpdate::Remove { id } => current.retain(|message| message.id != id),
        UiUpdate::Upsert(message) => {
            match current.iter_mut().find(|existing| existing.id == message.id) {
                Some(existing) => *existing = message,
                None => current.push(message),
            }
        }
    }
    current
}

/// Decoded `values` chunk. `None` fields were absent from the chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamUpdate {
    pub messages: Option<Vec<Message>>,
    pub ui: Option<Vec<UiUpdate>>,
    pub context: Option<Map<String, Value>>,
    pub interrupt: Option<Value>,
    /// Server-assigned ids of the interrupts in `interrupt`, when present.
    pub interrupt_ids: Vec<String>,
}

impl StreamUpdate {
    pub fn from_value(data: &Value) -> Self {
        let messages = data.get("messages").map(|raw| match raw {
            Value::Array(items) => items.iter().filter_map(parse_message).collect(),
            other => parse_message(other).into_iter().collect(),
        });
        let ui = data.get("ui").map(|raw| match raw {
            Value::Array(items) => items.iter().filter_map(parse_ui_update).collect(),
            other => parse_ui_update(other).into_iter().collect(),
        });
        let context = data.get("context").and_then(Value::as_object).cloned();
        let pending = data
            .get("__interrupt__")
            .and_then(Value::as_array)
            .filter(|items| !items.is_empty());
        let interrupt =
            pending.map(|items| Value::Array(items.iter().map(unwrap_interrupt).collect()));
        let interrupt_ids = pending
            .map(|items| items.iter().filter_map(interrupt_id).collect())
            .unwrap_or_default();

        Self {
            messages,
            ui,
            context,
            interrupt,
            interrupt_ids,
        }
    }
}

fn parse_message(raw: &Value) -> Option<Message> {
    if raw.is_string() {
        return None;
    }
    match serde_json::from_value::<Message>(raw.clone()) {
        Ok(message) => Some(message),
        Err(error) => {
            debug!(%error, "skipping undecodable message");
            None
        }
    }
}

fn parse_ui_update(raw: &Value) -> Option<UiUpdate> {
    serde_json::from_value(raw.clone()).ok()
}

fn unwrap_interrupt(item: &Value) -> Value {
    match item.get("value") {
        Some(value) if item.is_object() => value.clone(),
        _ => item.clone(),
    }
}

fn interrupt_id(item: &Value) -> Option<String> {
    item.get("id").and_then(Value::as_str).map(str::to_string)
}

/// Body of a run request: fresh input, a resume command, or neither (regenerate).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Value>,
}

impl RunInput {
    pub fn messages(messages: &[Message], context: Option<&Map<String, Value>>) -> Self {
        let mut input = json!({ "messages": messages });
        if let Some(context) = context {
            input["context"] = Value::Object(context.clone());
        }
        Self {
            input: Some(input),
            command: None,
        }
    }

    pub fn resume(resume: Value) -> Self {
        Self {
            input: None,
            command: Some(json!({ "resume": resume })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_joins_text_blocks() {
        let message: Message = serde_json::from_value(json!({
            "id": "m1",
            "type": "ai",
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image_url", "image_url": "x" },
                { "type": "text", "text": "second" }
            ]
        }))
        .expect("message should decode");
        assert_eq!(message.text_content(), "first\nsecond");
    }

    #[test]
    fn unknown_message_type_decodes_as_other() {
        let message: Message =
            serde_json::from_value(json!({ "type": "function", "content": "x" })).expect("decode");
        assert_eq!(message.kind, MessageType::Other);
        assert_eq!(message.id, "");
    }

    #[test]
    fn stream_update_drops_string_messages_and_reads_interrupt() {
        let update = StreamUpdate::from_value(&json!({
            "messages": ["noise", { "id": "a", "type": "human", "content": "hi" }],
            "context": { "k": 1 },
            "__interrupt__": [{ "value": { "question": "?" }, "id": "i1" }]
        }));
        let messages = update.messages.expect("messages present");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "a");
        assert_eq!(update.context.expect("context")["k"], json!(1));
        assert_eq!(update.interrupt, Some(json!([{ "question": "?" }])));
        assert!(update.ui.is_none());
    }

    #[test]
    fn stream_update_single_message_object_expected_one_message() {
        let update = StreamUpdate::from_value(&json!({
            "messages": { "id": "a", "type": "ai", "content": "x" }
        }));
        assert_eq!(update.messages.map(|m| m.len()), Some(1));
    }

    #[test]
    fn reduce_ui_upserts_and_removes() {
        let first = UiUpdate::Upsert(UiMessage {
            id: "card".to_string(),
            payload: Map::new(),
        });
        let mut replacement = Map::new();
        replacement.insert("name".to_string(), json!("weather"));
        let second = UiUpdate::Upsert(UiMessage {
            id: "card".to_string(),
            payload: replacement,
        });

        let state = reduce_ui(Vec::new(), first);
        let state = reduce_ui(state, second);
        assert_eq!(state.len(), 1);
        assert_eq!(state[0].payload["name"], json!("weather"));

        let state = reduce_ui(state, UiUpdate::Remove { id: "card".to_string() });
        assert!(state.is_empty());
    }

    #[test]
    fn ui_update_decodes_by_type_tag() {
        let update: UiUpdate =
            serde_json::from_value(json!({ "type": "remove-ui", "id": "x" })).expect("decode");
        assert_eq!(update, UiUpdate::Remove { id: "x".to_string() });
    }

    #[test]
    fn thread_interrupt_value_flattens_tasks() {
        let thread: Thread = serde_json::from_value(json!({
            "thread_id": "t1",
            "status": "interrupted",
            "interrupts": { "task-1": [{ "value": { "a": 1 } }] }
        }))
        .expect("thread should decode");
        assert_eq!(thread.status, ThreadStatus::Interrupted);
        assert_eq!(thread.interrupt_value(), Some(json!([{ "a": 1 }])));
        assert_eq!(Thread::new("t2").interrupt_value(), None);
    }

    #[test]
    fn run_input_resume_wraps_command() {
        let encoded = serde_json::to_value(RunInput::resume(json!([{ "type": "accept", "args": null }])))
            .expect("serialize");
        assert_eq!(
            encoded,
            json!({ "command": { "resume": [{ "type": "accept", "args": null }] } })
        );
    }
}
