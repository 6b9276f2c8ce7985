use forge_hitl::{HitlError, HumanResponse, InterruptValue, SubmitType};
use forge_threads::{
    ChatSession, ConnectionConfig, MockThreadClient, StreamChunk, Thread, ThreadDirectory,
};
use serde_json::{Value, json};
use std::sync::Arc;

fn interrupt_payload(action: &str, allow_ignore: bool) -> Value {
    json!({
        "action_request": {
            "action": action,
            "args": { "to": "team@example.com", "subject": "Weekly update" }
        },
        "config": {
            "allow_edit": true,
            "allow_respond": true,
            "allow_accept": true,
            "allow_ignore": allow_ignore
        },
        "description": "Review the draft email."
    })
}

fn respond_only_payload(action: &str) -> Value {
    let mut payload = interrupt_payload(action, true);
    payload["config"]["allow_accept"] = json!(false);
    payload
}

fn interrupted_thread(thread_id: &str, payload: Value) -> Thread {
    let mut thread = Thread::new(thread_id);
    thread.values = Some(json!({
        "messages": [{ "id": format!("{thread_id}-h"), "type": "human", "content": "send it" }]
    }));
    thread.interrupts = json!({ "task-1": [{ "value": payload, "id": "i-1" }] });
    thread
}

fn chat(client: &MockThreadClient) -> ChatSession {
    ChatSession::new(ConnectionConfig::default(), Arc::new(client.clone()))
}

#[tokio::test(flavor = "current_thread")]
async fn chat_streamed_interrupt_expected_composer_loaded() {
    let client = MockThreadClient::new();
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [{ "id": "h1", "type": "human", "content": "email the team" }],
        "__interrupt__": [{ "value": interrupt_payload("send_email", true), "id": "i-1" }]
    }))]);
    let mut chat = chat(&client);

    chat.send_message("email the team").await.expect("send");

    let interrupt = chat
        .interrupts()
        .current_interrupt()
        .expect("interrupt should load");
    assert_eq!(interrupt.action_request.action, "send_email");
    assert_eq!(chat.interrupts().drafts().drafts().len(), 2);
    assert_eq!(chat.interrupts().submit_label(), "Accept");
}

#[tokio::test(flavor = "current_thread")]
async fn chat_submit_accept_expected_resume_command_and_finished() {
    let client = MockThreadClient::new();
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [],
        "__interrupt__": [{ "value": interrupt_payload("send_email", true) }]
    }))]);
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [{ "id": "a1", "type": "ai", "content": "sent" }]
    }))]);
    let mut chat = chat(&client);
    chat.send_message("email the team").await.expect("send");

    let response = chat.submit_interrupt().await.expect("accept should submit");
    assert_eq!(response, HumanResponse::accept());

    let runs = client.recorded_runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(
        runs[1].input.command,
        Some(json!({ "resume": [{ "type": "accept", "args": null }] }))
    );
    assert_eq!(chat.snapshot().interrupt, None);
    assert!(chat.interrupts().flags().finished);
    assert!(!chat.interrupts().flags().loading);
}

#[tokio::test(flavor = "current_thread")]
async fn chat_submit_edit_expected_args_envelope() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");

    chat.interrupts_mut()
        .drafts_mut()
        .update_edit_field("subject", "Monthly update");
    let response = chat.submit_interrupt().await.expect("edit should submit");

    assert_eq!(response.kind, SubmitType::Edit);
    assert_eq!(
        client.recorded_runs()[0].input.command,
        Some(json!({ "resume": [{
            "type": "edit",
            "args": { "args": { "to": "team@example.com", "subject": "Monthly update" } }
        }] }))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn chat_submit_transport_failure_expected_drafts_kept() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");
    chat.interrupts_mut()
        .drafts_mut()
        .update_response_field("please shorten it");
    let before = chat.interrupts().drafts().clone();

    client.fail_next_run("gateway timeout");
    let error = chat.submit_interrupt().await.expect_err("submit fails");

    assert!(matches!(error, HitlError::Transport(_)));
    assert_eq!(chat.interrupts().drafts(), &before);
    assert!(!chat.interrupts().flags().is_busy());
    assert!(!chat.interrupts().flags().finished);
    assert!(chat.interrupts().current_interrupt().is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_reissued_identical_interrupt_expected_fresh_drafts() {
    let client = MockThreadClient::new();
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [],
        "__interrupt__": [{ "value": respond_only_payload("send_email"), "id": "i-1" }]
    }))]);
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [{ "id": "a1", "type": "ai", "content": "still need approval" }],
        "__interrupt__": [{ "value": respond_only_payload("send_email"), "id": "i-2" }]
    }))]);
    let mut chat = chat(&client);
    chat.send_message("email the team").await.expect("send");
    chat.interrupts_mut().drafts_mut().update_response_field("not yet");

    let response = chat.submit_interrupt().await.expect("response should submit");

    assert_eq!(response, HumanResponse::response("not yet"));
    assert_eq!(chat.snapshot().interrupt_ids, vec!["i-2".to_string()]);
    assert!(chat.interrupts().current_interrupt().is_some());
    assert!(!chat.interrupts().flags().finished);
    assert!(!chat.interrupts().drafts().has_added_response());
    assert_eq!(
        chat.interrupts().drafts().response_draft().expect("response").text,
        ""
    );
}

#[tokio::test(flavor = "current_thread")]
async fn chat_answered_interrupt_reissued_without_ids_expected_fresh_drafts() {
    let client = MockThreadClient::new();
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [],
        "__interrupt__": [{ "value": respond_only_payload("send_email") }]
    }))]);
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [],
        "__interrupt__": [{ "value": respond_only_payload("send_email") }]
    }))]);
    let mut chat = chat(&client);
    chat.send_message("email the team").await.expect("send");
    chat.interrupts_mut().drafts_mut().update_response_field("not yet");

    chat.submit_interrupt().await.expect("response should submit");

    assert!(!chat.interrupts().flags().finished);
    assert!(!chat.interrupts().drafts().has_added_response());
    assert_eq!(chat.sync_interrupt().map(|value| value.is_structured()), Some(true));
    assert!(!chat.interrupts().flags().finished);
}

#[tokio::test(flavor = "current_thread")]
async fn chat_submit_followed_by_different_interrupt_expected_new_action_loaded() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    client.push_run(vec![StreamChunk::values(json!({
        "messages": [],
        "__interrupt__": [{ "value": interrupt_payload("book_meeting", false), "id": "i-2" }]
    }))]);
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");
    chat.interrupts_mut()
        .drafts_mut()
        .update_edit_field("subject", "Monthly update");

    let response = chat.submit_interrupt().await.expect("edit should submit");

    assert_eq!(response.kind, SubmitType::Edit);
    let interrupt = chat.interrupts().current_interrupt().expect("next interrupt");
    assert_eq!(interrupt.action_request.action, "book_meeting");
    assert!(!chat.interrupts().drafts().has_edited());
    assert!(!chat.interrupts().flags().finished);
}

#[tokio::test(flavor = "current_thread")]
async fn chat_stop_during_submit_expected_cancelled_and_not_finished() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");
    chat.interrupts_mut()
        .drafts_mut()
        .update_response_field("please shorten it");
    let before = chat.interrupts().drafts().clone();

    let sender = client.push_channel_run();
    let abort = chat.stream().abort_handle();
    let mut updates = chat.stream().subscribe();
    let driver = async {
        updates
            .wait_for(|state| state.loading)
            .await
            .expect("resume run started");
        abort.request_abort();
    };
    let (outcome, ()) = tokio::join!(chat.submit_interrupt(), driver);
    drop(sender);

    assert_eq!(outcome, Err(HitlError::Cancelled));
    assert_eq!(chat.interrupts().flags(), Default::default());
    assert_eq!(chat.interrupts().drafts(), &before);
    assert!(chat.snapshot().interrupt.is_some());
    assert_eq!(chat.snapshot().error, None);
    assert!(chat.interrupts().current_interrupt().is_some());

    client.push_run(vec![StreamChunk::values(json!({
        "messages": [{ "id": "a1", "type": "ai", "content": "shortened" }]
    }))]);
    chat.submit_interrupt().await.expect("retry should submit");
    assert!(chat.interrupts().flags().finished);
}

#[tokio::test(flavor = "current_thread")]
async fn chat_select_thread_expected_previous_drafts_cleared() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    client.insert_thread(interrupted_thread("b", interrupt_payload("book_meeting", false)));
    client.insert_thread(Thread::new("c"));
    let mut chat = chat(&client);

    chat.select_thread("a").await.expect("select a");
    chat.interrupts_mut()
        .drafts_mut()
        .update_edit_field("subject", "changed");
    chat.interrupts_mut().drafts_mut().update_response_field("note");
    assert!(chat.interrupts().drafts().has_edited());

    chat.select_thread("b").await.expect("select b");
    let interrupt = chat.interrupts().current_interrupt().expect("b interrupt");
    assert_eq!(interrupt.action_request.action, "book_meeting");
    assert!(!chat.interrupts().drafts().has_edited());
    assert!(!chat.interrupts().drafts().has_added_response());
    assert_eq!(chat.snapshot().messages[0].id, "b-h");

    chat.select_thread("c").await.expect("select c");
    assert!(chat.sync_interrupt().is_none());
    assert!(chat.interrupts().current_interrupt().is_none());
    assert!(chat.interrupts().drafts().is_empty());
    assert!(chat.snapshot().messages.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_unstructured_interrupt_expected_no_drafts() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", json!("approve deployment?")));
    let mut chat = chat(&client);

    chat.select_thread("a").await.expect("select");
    let classified = chat.sync_interrupt().expect("interrupt present");

    assert!(matches!(classified, InterruptValue::Unstructured(_)));
    assert!(chat.interrupts().current_interrupt().is_none());
    assert!(chat.interrupts().drafts().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_resolve_thread_expected_marked_end_and_composer_cleared() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");

    chat.resolve_thread().await.expect("resolve");

    assert_eq!(client.resolved_threads(), vec!["a".to_string()]);
    assert_eq!(client.state_updates()[0].values, Value::Null);
    assert!(chat.interrupts().current_interrupt().is_none());
    assert_eq!(chat.interrupts().flags(), Default::default());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_ignore_thread_expected_ignore_resume() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("a", interrupt_payload("send_email", true)));
    let mut chat = chat(&client);
    chat.select_thread("a").await.expect("select");

    chat.ignore_thread().await.expect("ignore");

    assert_eq!(
        client.recorded_runs()[0].input.command,
        Some(json!({ "resume": [{ "type": "ignore", "args": null }] }))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn chat_ignore_disallowed_expected_not_allowed_without_run() {
    let client = MockThreadClient::new();
    client.insert_thread(interrupted_thread("b", interrupt_payload("book_meeting", false)));
    let mut chat = chat(&client);
    chat.select_thread("b").await.expect("select");

    let error = chat.ignore_thread().await.expect_err("ignore disallowed");
    assert_eq!(error, HitlError::NotAllowed("ignore".to_string()));
    assert!(client.recorded_runs().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_delete_active_thread_expected_detached() {
    let client = MockThreadClient::new();
    let mut chat = chat(&client);
    chat.send_message("hi").await.expect("send");
    assert_eq!(chat.thread_id().as_deref(), Some("thread-1"));
    assert_eq!(chat.list_threads().await.len(), 1);

    chat.delete_thread("thread-1").await.expect("delete");

    assert_eq!(chat.thread_id(), None);
    assert!(chat.directory().threads().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn chat_studio_url_expected_thread_link() {
    let client = MockThreadClient::new();
    let mut chat = chat(&client);
    chat.send_message("hi").await.expect("send");

    assert_eq!(
        chat.studio_url().expect("url"),
        "https://smith.langchain.com/studio/thread/thread-1?baseUrl=http%3A%2F%2Flocalhost%3A2024"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn directory_create_and_delete_expected_refreshed_list() {
    let client = MockThreadClient::new();
    let directory = ThreadDirectory::new(Arc::new(client.clone()));

    let first = directory.create_thread("agent").await.expect("create");
    directory.create_thread("agent").await.expect("create");
    client.insert_thread(Thread::new("foreign"));
    assert_eq!(directory.threads().len(), 2);

    directory
        .delete_thread("agent", &first.thread_id)
        .await
        .expect("delete");
    let remaining = directory.threads();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].thread_id, "thread-2");
}

#[tokio::test(flavor = "current_thread")]
async fn directory_refresh_failure_expected_empty_list() {
    let client = MockThreadClient::new();
    let directory = ThreadDirectory::new(Arc::new(client.clone()));
    directory.create_thread("agent").await.expect("create");
    assert_eq!(directory.threads().len(), 1);

    client.fail_next_call("search unavailable");
    assert!(directory.refresh("agent").await.is_empty());
    assert!(directory.threads().is_empty());
}
