mod console;

use clap::{ArgAction, Parser, Subcommand};
use forge_hitl::{
    HitlError, HitlEvent, HitlEventKind, HitlEventSink, HumanInterrupt, InterruptValue,
    format_value, hitl_event_channel, title_for,
};
use forge_threads::{ChatSession, ConnectionConfig, StreamState, default_settings_path};
use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "forge-cli")]
#[command(about = "Terminal host for Forge agent threads and interrupts")]
struct Cli {
    /// Settings file; defaults to FORGE_CHAT_SETTINGS or ~/.config/forge/chat.json.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Setup(SetupArgs),
    Status,
    Threads(ThreadsArgs),
    Chat(ChatArgs),
    Inbox(InboxArgs),
}

#[derive(clap::Args, Debug)]
struct SetupArgs {
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    assistant_id: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ThreadsArgs {
    #[arg(long)]
    delete: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    #[arg(long)]
    thread: Option<String>,
    message: String,
}

#[derive(clap::Args, Debug)]
struct InboxArgs {
    #[arg(long)]
    thread: String,
    #[arg(long, action = ArgAction::SetTrue)]
    accept: bool,
    #[arg(long)]
    respond: Option<String>,
    /// Replace one argument before submitting; repeatable.
    #[arg(long = "edit", value_name = "KEY=VALUE")]
    edits: Vec<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    ignore: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    resolve: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    event_json: bool,
}

impl InboxArgs {
    fn has_decision(&self) -> bool {
        self.accept || self.respond.is_some() || !self.edits.is_empty() || self.ignore || self.resolve
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let settings = cli.settings.unwrap_or_else(default_settings_path);
    let result = match cli.command {
        Commands::Setup(args) => setup_command(&settings, args),
        Commands::Status => status_command(&settings).await,
        Commands::Threads(args) => threads_command(&settings, args).await,
        Commands::Chat(args) => chat_command(&settings, args).await,
        Commands::Inbox(args) => inbox_command(&settings, args).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_command(settings: &Path, args: SetupArgs) -> Result<ExitCode, String> {
    let current = load_config(settings)?;
    let config = ConnectionConfig::new(
        args.api_url.unwrap_or(current.api_url),
        args.assistant_id.unwrap_or(current.assistant_id),
        args.api_key.or(current.api_key),
    );
    config.save(settings).map_err(|error| error.to_string())?;
    println!("settings: {}", settings.display());
    println!("api_url: {}", config.api_url);
    println!("assistant_id: {}", config.assistant_id);
    Ok(ExitCode::SUCCESS)
}

async fn status_command(settings: &Path) -> Result<ExitCode, String> {
    let chat = connect(settings, HitlEventSink::default())?;
    chat.check_status()
        .await
        .map_err(|error| format!("server {} unreachable: {error}", chat.config().api_url))?;
    println!("connected: {}", chat.config().api_url);
    println!("assistant_id: {}", chat.config().assistant_id);
    Ok(ExitCode::SUCCESS)
}

async fn threads_command(settings: &Path, args: ThreadsArgs) -> Result<ExitCode, String> {
    let mut chat = connect(settings, HitlEventSink::default())?;
    if let Some(thread_id) = args.delete.as_deref() {
        chat.delete_thread(thread_id)
            .await
            .map_err(|error| error.to_string())?;
        println!("deleted: {thread_id}");
        return Ok(ExitCode::SUCCESS);
    }

    let threads = chat.list_threads().await;
    if args.json {
        let json = serde_json::to_string_pretty(&threads).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(ExitCode::SUCCESS);
    }
    if threads.is_empty() {
        println!("no threads");
    }
    for thread in threads {
        let status = serde_json::to_value(thread.status)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("{}  {:<11}  {}", thread.thread_id, status, thread.preview());
    }
    Ok(ExitCode::SUCCESS)
}

async fn chat_command(settings: &Path, args: ChatArgs) -> Result<ExitCode, String> {
    let mut chat = connect(settings, HitlEventSink::default())?;
    if let Some(thread_id) = args.thread.as_deref() {
        chat.select_thread(thread_id)
            .await
            .map_err(|error| error.to_string())?;
    }

    let mut printer = MessagePrinter::seeded(&chat.snapshot());
    let mut updates = chat.stream().subscribe();
    let abort = chat.stream().abort_handle();
    let mut stopping = false;

    let sent = {
        let send = chat.send_message(args.message);
        tokio::pin!(send);
        loop {
            tokio::select! {
                sent = &mut send => break sent,
                changed = updates.changed() => {
                    if changed.is_ok() {
                        printer.print_new(&updates.borrow_and_update());
                    }
                }
                signal = tokio::signal::ctrl_c(), if !stopping => {
                    stopping = true;
                    if signal.is_ok() {
                        eprintln!("stopping run");
                        abort.request_abort();
                    }
                }
            }
        }
    };
    let sent = sent.map_err(|error| error.to_string())?;
    if !sent {
        return Err("message is empty".to_string());
    }

    let state = chat.snapshot();
    printer.print_new(&state);
    if let Some(thread_id) = state.thread_id.as_deref() {
        println!("thread: {thread_id}");
        if state.interrupt.is_some() {
            println!("interrupt pending: forge-cli inbox --thread {thread_id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn inbox_command(settings: &Path, args: InboxArgs) -> Result<ExitCode, String> {
    let edits = parse_edits(&args.edits)?;
    let (events, event_task) = event_stream(args.event_json);
    let mut chat = connect(settings, events)?;

    chat.select_thread(&args.thread)
        .await
        .map_err(|error| error.to_string())?;
    let outcome = match chat.sync_interrupt() {
        None => {
            println!("no pending interrupt on thread {}", args.thread);
            Ok(ExitCode::SUCCESS)
        }
        Some(InterruptValue::Unstructured(value)) => {
            println!("interrupt:\n{}", format_value(&value));
            if args.resolve {
                finish_action(chat.resolve_thread().await, "resolved")
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Some(InterruptValue::Structured(interrupt)) => {
            print_interrupt(&interrupt);
            if args.has_decision() {
                apply_decision(&mut chat, &args, edits).await
            } else if is_interactive_terminal() {
                console::compose(&mut chat).await
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    };

    drop(chat);
    if let Some(task) = event_task {
        task.await.map_err(|error| error.to_string())?;
    }
    outcome
}

async fn apply_decision(
    chat: &mut ChatSession,
    args: &InboxArgs,
    edits: Vec<(String, String)>,
) -> Result<ExitCode, String> {
    if args.resolve {
        return finish_action(chat.resolve_thread().await, "resolved");
    }
    if args.ignore {
        return finish_action(chat.ignore_thread().await, "ignored");
    }

    let drafts = chat.interrupts_mut().drafts_mut();
    if !edits.is_empty() && !drafts.update_edit_fields_bulk(edits) {
        return Err("this interrupt does not allow editing".to_string());
    }
    if let Some(text) = args.respond.as_deref() {
        if !drafts.update_response_field(text) {
            return Err("this interrupt does not allow responding".to_string());
        }
    }
    submit(chat).await
}

pub(crate) async fn submit(chat: &mut ChatSession) -> Result<ExitCode, String> {
    let response = chat
        .submit_interrupt()
        .await
        .map_err(|error| submit_error(&error))?;
    println!("submitted: {}", response.kind);
    print_follow_up(&chat.snapshot());
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn finish_action(outcome: Result<(), HitlError>, label: &str) -> Result<ExitCode, String> {
    outcome.map_err(|error| submit_error(&error))?;
    println!("{label}");
    Ok(ExitCode::SUCCESS)
}

fn submit_error(error: &HitlError) -> String {
    match error {
        HitlError::NoValidSubmission => {
            "nothing to submit: edit an argument, write a response or accept".to_string()
        }
        HitlError::Transport(reason) => format!("submission failed, drafts kept: {reason}"),
        HitlError::Cancelled => {
            "submission stopped before the server confirmed it, drafts kept".to_string()
        }
        other => other.to_string(),
    }
}

fn print_follow_up(state: &StreamState) {
    if let Some(last) = state.messages.last() {
        println!("[{}] {}", last.kind.label(), last.text_content());
    }
    if state.interrupt.is_some() {
        println!("another interrupt is pending");
    }
}

pub(crate) fn print_interrupt(interrupt: &HumanInterrupt) {
    println!("interrupt: {}", title_for(Some(interrupt)));
    if let Some(description) = interrupt.description.as_deref() {
        println!("{description}");
    }
    for entry in forge_hitl::arg_entries(&interrupt.action_request.args) {
        println!("  {}: {}", forge_hitl::prettify_text(&entry.key), entry.value);
    }
    let config = interrupt.config;
    let allowed: Vec<&str> = [
        (config.allow_accept, "accept"),
        (config.allow_edit, "edit"),
        (config.allow_respond, "respond"),
        (config.allow_ignore, "ignore"),
    ]
    .into_iter()
    .filter_map(|(allowed, label)| allowed.then_some(label))
    .collect();
    if allowed.is_empty() {
        println!("allowed: none (resolve only)");
    } else {
        println!("allowed: {}", allowed.join(", "));
    }
}

fn parse_edits(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .ok_or_else(|| format!("--edit expects KEY=VALUE, got '{entry}'"))
        })
        .collect()
}

fn load_config(settings: &Path) -> Result<ConnectionConfig, String> {
    if settings.exists() {
        ConnectionConfig::load(settings)
            .map_err(|e| format!("failed reading settings '{}': {e}", settings.display()))
    } else {
        Ok(ConnectionConfig::from_env())
    }
}

fn connect(settings: &Path, events: HitlEventSink) -> Result<ChatSession, String> {
    let config = load_config(settings)?;
    debug!(api_url = %config.api_url, assistant_id = %config.assistant_id, "connecting");
    let client = forge_threads::HttpThreadClient::from_config(&config)
        .map_err(|error| error.to_string())?;
    Ok(ChatSession::with_events(
        config,
        std::sync::Arc::new(client),
        events,
    ))
}

fn event_stream(event_json: bool) -> (HitlEventSink, Option<tokio::task::JoinHandle<()>>) {
    if !event_json {
        return (HitlEventSink::default(), None);
    }

    let (tx, mut rx) = hitl_event_channel();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{line}"),
                Err(_) => print_event_text(&event),
            }
        }
    });
    (HitlEventSink::with_sender(tx), Some(task))
}

fn print_event_text(event: &HitlEvent) {
    eprintln!(
        "[event seq={}] {}",
        event.sequence_no,
        event_kind_label(&event.kind)
    );
}

fn event_kind_label(kind: &HitlEventKind) -> &'static str {
    match kind {
        HitlEventKind::InterruptLoaded { .. } => "interrupt_loaded",
        HitlEventKind::UnstructuredInterrupt => "unstructured_interrupt",
        HitlEventKind::Cleared => "cleared",
        HitlEventKind::SubmitStarted { .. } => "submit_started",
        HitlEventKind::Submitted { .. } => "submitted",
        HitlEventKind::SubmitRejected { .. } => "submit_rejected",
        HitlEventKind::SubmitFailed { .. } => "submit_failed",
        HitlEventKind::SubmitCancelled { .. } => "submit_cancelled",
        HitlEventKind::ThreadResolved => "thread_resolved",
        HitlEventKind::ThreadIgnored => "thread_ignored",
        HitlEventKind::ThreadActionFailed { .. } => "thread_action_failed",
    }
}

/// Prints each message once, keyed by id.
struct MessagePrinter {
    seen: HashSet<String>,
}

impl MessagePrinter {
    fn seeded(state: &StreamState) -> Self {
        Self {
            seen: state.messages.iter().map(|message| message.id.clone()).collect(),
        }
    }

    fn print_new(&mut self, state: &StreamState) {
        for message in &state.messages {
            if self.seen.insert(message.id.clone()) {
                println!("[{}] {}", message.kind.label(), message.text_content());
            }
        }
    }
}

pub(crate) fn is_interactive_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}
