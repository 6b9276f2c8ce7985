//! Text helpers for rendering interrupts and drafts.

use crate::{ArgMap, EditDraft, HumanInterrupt};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgEntry {
    pub key: String,
    pub value: String,
}

/// `send_email` -> `Send Email`, `maxResults` -> `Max Results`.
pub fn prettify_text(text: &str) -> String {
    let joined = text
        .split(['_', '-'])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::with_capacity(joined.len() + 4);
    let mut previous: Option<char> = None;
    for ch in joined.chars() {
        if let Some(prev) = previous {
            if prev.is_ascii_lowercase() && ch.is_ascii_uppercase() {
                out.push(' ');
            }
        }
        out.push(ch);
        previous = Some(ch);
    }
    out
}

/// Generic rendering for opaque interrupt payloads and state values.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

pub fn arg_entries(args: &ArgMap) -> Vec<ArgEntry> {
    args.iter()
        .map(|(key, value)| ArgEntry {
            key: key.clone(),
            value: format_value(value),
        })
        .collect()
}

pub fn edit_entries(draft: &EditDraft) -> Vec<ArgEntry> {
    arg_entries(&draft.args)
}

pub fn title_for(interrupt: Option<&HumanInterrupt>) -> String {
    interrupt
        .map(|interrupt| interrupt.action_request.action.as_str())
        .filter(|action| !action.is_empty())
        .map(prettify_text)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Args are shown read-only inside the response card when nothing else can show them.
pub fn show_args_in_response(interrupt: &HumanInterrupt) -> bool {
    let config = interrupt.config;
    !interrupt.action_request.args.is_empty()
        && !config.allow_edit
        && !config.allow_accept
        && config.allow_respond
}

pub fn show_args_outside_cards(interrupt: &HumanInterrupt) -> bool {
    let config = interrupt.config;
    !interrupt.action_request.args.is_empty()
        && !show_args_in_response(interrupt)
        && !config.allow_edit
        && !config.allow_accept
}
