use crate::{finish_action, submit};
use forge_hitl::{edit_entries, prettify_text};
use forge_threads::ChatSession;
use std::io::{self, Write};
use std::process::ExitCode;

/// Interactive composer for the structured interrupt loaded in `chat`.
pub(crate) async fn compose(chat: &mut ChatSession) -> Result<ExitCode, String> {
    loop {
        let Some(interrupt) = chat.interrupts().current_interrupt().cloned() else {
            return Ok(ExitCode::SUCCESS);
        };
        let drafts = chat.interrupts().drafts();
        let mut options = Vec::new();
        if drafts.edit_draft().is_some() {
            options.push("[e]dit");
        }
        if drafts.response_draft().is_some() {
            options.push("[r]espond");
        }
        if drafts.has_edited() {
            options.push("re[v]ert");
        }
        options.push("[s]ubmit");
        if interrupt.config.allow_ignore {
            options.push("[i]gnore");
        }
        options.push("mark [d]one");
        options.push("[q]uit");
        eprintln!(
            "{} ({})",
            options.join(" "),
            chat.interrupts().submit_label()
        );

        let Some(choice) = prompt("action: ").await else {
            return Ok(ExitCode::SUCCESS);
        };
        match choice.to_ascii_lowercase().as_str() {
            "e" | "edit" => edit_fields(chat).await,
            "r" | "respond" => {
                if let Some(text) = prompt("> ").await {
                    chat.interrupts_mut().drafts_mut().update_response_field(text);
                }
            }
            "v" | "revert" => {
                chat.interrupts_mut().drafts_mut().reset_edit_fields();
            }
            "s" | "submit" => match submit(chat).await {
                Ok(code) => return Ok(code),
                Err(error) => eprintln!("{error}"),
            },
            "i" | "ignore" => return finish_action(chat.ignore_thread().await, "ignored"),
            "d" | "done" => return finish_action(chat.resolve_thread().await, "resolved"),
            "q" | "quit" | "" => return Ok(ExitCode::SUCCESS),
            other => eprintln!("unknown action '{other}'"),
        }
    }
}

async fn edit_fields(chat: &mut ChatSession) {
    let Some(draft) = chat.interrupts().drafts().edit_draft().cloned() else {
        return;
    };
    let mut updates = Vec::new();
    for entry in edit_entries(&draft) {
        let label = format!("{} [{}]: ", prettify_text(&entry.key), entry.value);
        match prompt(&label).await {
            Some(value) if !value.is_empty() => updates.push((entry.key, value)),
            Some(_) => {}
            None => return,
        }
    }
    chat.interrupts_mut()
        .drafts_mut()
        .update_edit_fields_bulk(updates);
}

async fn prompt(text: &str) -> Option<String> {
    let text = text.to_string();
    tokio::task::spawn_blocking(move || read_line(&text))
        .await
        .ok()
        .flatten()
}

fn read_line(prompt: &str) -> Option<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}").ok()?;
    stderr.flush().ok()?;

    let mut raw = String::new();
    if io::stdin().read_line(&mut raw).ok()? == 0 {
        return None;
    }
    Some(raw.trim().to_string())
}
