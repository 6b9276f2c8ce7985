use crate::{HitlError, HumanResponse, ResponseDraftStore};

/// Picks the single response to submit.
///
/// Precedence, first match wins:
/// 1. untouched edit draft that allows accept -> `accept`
/// 2. edit draft with changes -> `edit`
/// 3. response draft with non-blank text -> `response`
/// 4. otherwise [`HitlError::NoValidSubmission`]
pub fn resolve(store: &ResponseDraftStore) -> Result<HumanResponse, HitlError> {
    if let Some(edit) = store.edit_draft() {
        if edit.accept_allowed && !edit.edits_made {
            return Ok(HumanResponse::accept());
        }
        if edit.edits_made {
            return Ok(HumanResponse::edit(edit.args.clone()));
        }
    }
    if let Some(response) = store.response_draft().filter(|response| response.has_content) {
        return Ok(HumanResponse::response(response.text.clone()));
    }
    Err(HitlError::NoValidSubmission)
}

pub fn can_submit(store: &ResponseDraftStore) -> bool {
    resolve(store).is_ok()
}

/// Label for the edit card's submit control.
pub fn submit_label(store: &ResponseDraftStore) -> &'static str {
    match store.edit_draft() {
        Some(edit) if edit.accept_allowed && !edit.edits_made => "Accept",
        _ => "Submit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HumanInterrupt, HumanInterruptConfig, SubmitType};
    use serde_json::json;

    fn store(config: HumanInterruptConfig) -> ResponseDraftStore {
        let args = json!({ "to": "user@example.com", "subject": "Project Update" });
        ResponseDraftStore::from_interrupt(&HumanInterrupt::new(
            "send_email",
            args.as_object().cloned().expect("object args"),
            config,
        ))
    }

    fn config(edit: bool, respond: bool, accept: bool) -> HumanInterruptConfig {
        HumanInterruptConfig {
            allow_edit: edit,
            allow_respond: respond,
            allow_accept: accept,
            allow_ignore: false,
        }
    }

    #[test]
    fn resolve_untouched_edit_with_accept_expected_accept() {
        let store = store(config(true, true, true));
        assert_eq!(resolve(&store), Ok(HumanResponse::accept()));
        assert_eq!(submit_label(&store), "Accept");
    }

    #[test]
    fn resolve_reverted_edit_expected_accept_again() {
        let mut store = store(config(true, false, true));
        store.update_edit_field("subject", "Changed");
        assert_eq!(resolve(&store).map(|r| r.kind), Ok(SubmitType::Edit));
        assert_eq!(submit_label(&store), "Submit");

        store.update_edit_field("subject", "Project Update");
        assert_eq!(resolve(&store), Ok(HumanResponse::accept()));
    }

    #[test]
    fn resolve_edit_without_accept() {
        let mut store = store(config(true, false, false));
        assert_eq!(resolve(&store), Err(HitlError::NoValidSubmission));

        store.update_edit_field("subject", "Weekly Update");
        let response = resolve(&store).expect("edit should resolve");
        assert_eq!(response.kind, SubmitType::Edit);
        assert_eq!(
            response.args,
            json!({ "args": { "to": "user@example.com", "subject": "Weekly Update" } })
        );
    }

    #[test]
    fn resolve_response_only_requires_non_blank_text() {
        let mut store = store(config(false, true, false));
        store.update_response_field("   ");
        assert_eq!(resolve(&store), Err(HitlError::NoValidSubmission));

        store.update_response_field("ok");
        assert_eq!(resolve(&store), Ok(HumanResponse::response("ok")));
    }

    #[test]
    fn resolve_dirty_edit_wins_over_response_text() {
        let mut store = store(config(true, true, false));
        store.update_response_field("please also cc me");
        store.update_edit_field("to", "team@example.com");
        assert_eq!(resolve(&store).map(|r| r.kind), Ok(SubmitType::Edit));
    }

    #[test]
    fn resolve_untouched_accept_shadows_typed_response() {
        let mut store = store(config(true, true, true));
        store.update_response_field("some note");
        assert_eq!(resolve(&store), Ok(HumanResponse::accept()));
    }

    #[test]
    fn resolve_degenerate_config_expected_no_valid_submission() {
        let store = store(HumanInterruptConfig::default());
        assert!(store.is_empty());
        assert_eq!(resolve(&store), Err(HitlError::NoValidSubmission));
        assert!(!can_submit(&store));
    }

    #[test]
    fn resolve_accept_without_edit_capability_has_no_path() {
        let store = store(config(false, false, true));
        assert_eq!(resolve(&store), Err(HitlError::NoValidSubmission));
    }
}
