use crate::{ArgMap, HumanInterrupt, SubmitType, value_text};
use serde_json::Value;
use std::collections::BTreeMap;

/// Frozen text snapshot of the action's arguments, keyed like the edit draft.
pub type InitialValues = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct EditDraft {
    pub args: ArgMap,
    pub edits_made: bool,
    pub accept_allowed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseTextDraft {
    pub text: String,
    pub has_content: bool,
}

/// Read-only view of one candidate response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseDraft {
    Edit(EditDraft),
    Response(ResponseTextDraft),
}

impl ResponseDraft {
    pub fn submit_type(&self) -> SubmitType {
        match self {
            Self::Edit(_) => SubmitType::Edit,
            Self::Response(_) => SubmitType::Response,
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Edit(draft) => draft.edits_made,
            Self::Response(draft) => draft.has_content,
        }
    }
}

/// Candidate responses for the interrupt currently on screen.
///
/// Holds at most one edit draft and one response draft. Accept and ignore are
/// capabilities checked at submit time and never stored as drafts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseDraftStore {
    edit: Option<EditDraft>,
    response: Option<ResponseTextDraft>,
    initial_values: InitialValues,
    accept_allowed: bool,
}

impl ResponseDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_interrupt(interrupt: &HumanInterrupt) -> Self {
        let mut store = Self::new();
        store.initialize(interrupt);
        store
    }

    pub fn initialize(&mut self, interrupt: &HumanInterrupt) {
        self.clear();
        let config = interrupt.config;

        if config.allow_edit {
            let args = interrupt.action_request.args.clone();
            self.initial_values = args
                .iter()
                .map(|(key, value)| (key.clone(), value_text(value)))
                .collect();
            self.edit = Some(EditDraft {
                args,
                edits_made: false,
                accept_allowed: config.allow_accept,
            });
        }
        if config.allow_respond {
            self.response = Some(ResponseTextDraft::default());
        }
        self.accept_allowed = config.allow_accept;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns `false` when there is no edit draft to write into.
    pub fn update_edit_field(&mut self, key: &str, value: impl Into<String>) -> bool {
        self.update_edit_fields_bulk([(key.to_string(), value.into())])
    }

    pub fn update_edit_fields_bulk<I, K, V>(&mut self, entries: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let Some(edit) = self.edit.as_mut() else {
            return false;
        };
        for (key, value) in entries {
            edit.args.insert(key.into(), Value::String(value.into()));
        }
        // Recomputed over every key so that reverting the last change clears the flag.
        edit.edits_made = edit
            .args
            .iter()
            .any(|(key, value)| self.initial_values.get(key) != Some(&value_text(value)));
        true
    }

    /// Writes every initial value back into the edit draft in one step.
    pub fn reset_edit_fields(&mut self) -> bool {
        let Some(edit) = self.edit.as_ref() else {
            return false;
        };
        let entries: Vec<(String, String)> = self
            .initial_values
            .iter()
            .filter(|(key, _)| edit.args.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if entries.is_empty() {
            return false;
        }
        self.update_edit_fields_bulk(entries)
    }

    pub fn update_response_field(&mut self, text: impl Into<String>) -> bool {
        let Some(response) = self.response.as_mut() else {
            return false;
        };
        response.text = text.into();
        response.has_content = !response.text.trim().is_empty();
        true
    }

    pub fn reset_response_field(&mut self) -> bool {
        self.update_response_field(String::new())
    }

    pub fn drafts(&self) -> Vec<ResponseDraft> {
        let mut drafts = Vec::with_capacity(2);
        if let Some(edit) = &self.edit {
            drafts.push(ResponseDraft::Edit(edit.clone()));
        }
        if let Some(response) = &self.response {
            drafts.push(ResponseDraft::Response(response.clone()));
        }
        drafts
    }

    pub fn edit_draft(&self) -> Option<&EditDraft> {
        self.edit.as_ref()
    }

    pub fn response_draft(&self) -> Option<&ResponseTextDraft> {
        self.response.as_ref()
    }

    pub fn initial_values(&self) -> &InitialValues {
        &self.initial_values
    }

    pub fn has_edited(&self) -> bool {
        self.edit.as_ref().is_some_and(|edit| edit.edits_made)
    }

    pub fn has_added_response(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| response.has_content)
    }

    pub fn accept_allowed(&self) -> bool {
        self.accept_allowed
    }

    pub fn supports_multiple_methods(&self) -> bool {
        self.edit.is_some() && self.response.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.edit.is_none() && self.response.is_none()
    }
}
