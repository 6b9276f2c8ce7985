use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

pub type ArgMap = Map<String, Value>;

/// The action an agent proposes to run once a human signs off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub args: ArgMap,
}

/// Response types the human is allowed to pick for one interrupt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInterruptConfig {
    pub allow_edit: bool,
    pub allow_respond: bool,
    pub allow_accept: bool,
    pub allow_ignore: bool,
}

impl HumanInterruptConfig {
    pub fn all() -> Self {
        Self {
            allow_edit: true,
            allow_respond: true,
            allow_accept: true,
            allow_ignore: true,
        }
    }

    /// No flag set: the interrupt can never be answered through the resolver.
    pub fn is_degenerate(&self) -> bool {
        !(self.allow_edit || self.allow_respond || self.allow_accept || self.allow_ignore)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanInterrupt {
    pub action_request: ActionRequest,
    pub config: HumanInterruptConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HumanInterrupt {
    pub fn new(action: impl Into<String>, args: ArgMap, config: HumanInterruptConfig) -> Self {
        Self {
            action_request: ActionRequest {
                action: action.into(),
                args,
            },
            config,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitType {
    Edit,
    Response,
    Accept,
    Ignore,
}

impl SubmitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Response => "response",
            Self::Accept => "accept",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for SubmitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of the answer sent back to the paused run: `{"type": ..., "args": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanResponse {
    #[serde(rename = "type")]
    pub kind: SubmitType,
    pub args: Value,
}

impl HumanResponse {
    pub fn accept() -> Self {
        Self {
            kind: SubmitType::Accept,
            args: Value::Null,
        }
    }

    pub fn ignore() -> Self {
        Self {
            kind: SubmitType::Ignore,
            args: Value::Null,
        }
    }

    /// Edited arguments travel wrapped as `{"args": {...}}`.
    pub fn edit(args: ArgMap) -> Self {
        Self {
            kind: SubmitType::Edit,
            args: json!({ "args": args }),
        }
    }

    pub fn response(text: impl Into<String>) -> Self {
        Self {
            kind: SubmitType::Response,
            args: Value::String(text.into()),
        }
    }
}

/// Canonical text form used for dirty checks: strings verbatim, anything else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
