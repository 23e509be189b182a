use std::{io::Write as _, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    BackendGateway, ConversationStore, CreateOutcome, DeliveryState, HttpBackendGateway,
    MessageEntry, SendOutcome, SendSkipReason, StoreError, TaskStore, UiMode, UiModeController,
};
use shared::domain::{ConversationId, Role, Task, TaskId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the assistant server.
    #[arg(long, env = "APP_SERVER_URL", default_value = "http://127.0.0.1:8001")]
    server_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let args = Args::parse();

    let gateway = Arc::new(HttpBackendGateway::new(args.server_url.clone()));
    let mut repl = Repl::new(gateway);

    match repl.gateway.health().await {
        Ok(status) => println!("{} ({})", status.message, args.server_url),
        Err(error) => warn!(%error, "server not reachable; commands will fail until it is up"),
    }
    if let Err(error) = repl.conversations.list_conversations().await {
        warn!(%error, "could not load conversations");
    }
    if let Err(error) = repl.tasks.list_tasks().await {
        warn!(%error, "could not load tasks");
    }

    println!("Type a message to chat, /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        repl.prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        if command == Command::Quit {
            break;
        }
        repl.execute(command).await;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Quit,
    Switch(UiMode),
    Health,
    List,
    New(String),
    Open(String),
    Delete(String),
    Compose(String),
    Add { title: String, description: String },
    Retry,
    Discard,
    Done(usize),
    Undo(usize),
    Invalid(String),
}

/// Splits one input line into a command. Lines without a leading slash are
/// compose input; what that means depends on the active mode.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Compose(line.to_string()));
    };
    let (verb, argument) = match rest.split_once(char::is_whitespace) {
        Some((verb, argument)) => (verb, argument.trim()),
        None => (rest, ""),
    };
    let command = match verb {
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "chat" => Command::Switch(UiMode::Chat),
        "tasks" => Command::Switch(UiMode::Tasks),
        "health" => Command::Health,
        "list" => Command::List,
        "new" => Command::New(argument.to_string()),
        "open" => Command::Open(argument.to_string()),
        "delete" => Command::Delete(argument.to_string()),
        "add" => {
            let (title, description) = match argument.split_once('|') {
                Some((title, description)) => (title.trim(), description.trim()),
                None => (argument, ""),
            };
            Command::Add {
                title: title.to_string(),
                description: description.to_string(),
            }
        }
        "retry" => Command::Retry,
        "discard" => Command::Discard,
        "done" | "undo" => match argument.parse::<usize>() {
            Ok(number) if verb == "done" => Command::Done(number),
            Ok(number) => Command::Undo(number),
            Err(_) => Command::Invalid(format!("/{verb} needs a task number")),
        },
        _ => Command::Invalid(format!("unknown command /{verb}")),
    };
    Some(command)
}

struct Repl {
    gateway: Arc<HttpBackendGateway>,
    conversations: Arc<ConversationStore>,
    tasks: Arc<TaskStore>,
    ui: UiModeController,
}

impl Repl {
    fn new(gateway: Arc<HttpBackendGateway>) -> Self {
        Self {
            conversations: ConversationStore::new(gateway.clone()),
            tasks: TaskStore::new(gateway.clone()),
            gateway,
            ui: UiModeController::new(),
        }
    }

    fn prompt(&self) -> Result<()> {
        let mode = match self.ui.mode() {
            UiMode::Chat => "chat",
            UiMode::Tasks => "tasks",
        };
        print!("{mode}> ");
        std::io::stdout().flush()?;
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Help => print_help(),
            Command::Quit => {}
            Command::Switch(mode) => self.ui.switch_to(mode),
            Command::Health => match self.gateway.health().await {
                Ok(status) => println!("{}", status.message),
                Err(error) => println!("health check failed: {error}"),
            },
            Command::List => match self.ui.mode() {
                UiMode::Chat => self.list_conversations().await,
                UiMode::Tasks => self.list_tasks().await,
            },
            Command::New(title) => self.create_conversation(&title).await,
            Command::Open(token) => self.open_conversation(&token).await,
            Command::Delete(token) => match self.ui.mode() {
                UiMode::Chat => self.delete_conversation(&token).await,
                UiMode::Tasks => self.delete_task(&token).await,
            },
            Command::Compose(text) => match self.ui.mode() {
                UiMode::Chat => {
                    self.ui.set_message_draft(text);
                    self.send_draft().await;
                }
                UiMode::Tasks => {
                    self.ui.set_task_draft(text, "");
                    self.add_task_from_draft().await;
                }
            },
            Command::Add { title, description } => {
                self.ui.set_task_draft(title, description);
                self.add_task_from_draft().await;
            }
            Command::Retry => self.retry_send().await,
            Command::Discard => self.discard_failed().await,
            Command::Done(number) => self.toggle_task(number, true).await,
            Command::Undo(number) => self.toggle_task(number, false).await,
            Command::Invalid(message) => println!("{message}; /help lists commands"),
        }
    }

    async fn list_conversations(&self) {
        match self.conversations.list_conversations().await {
            Ok(summaries) if summaries.is_empty() => println!("no conversations; /new starts one"),
            Ok(summaries) => {
                let selected = self.conversations.selected_id().await;
                for (number, summary) in summaries.iter().enumerate() {
                    let marker = if selected == Some(summary.id) { "*" } else { " " };
                    println!(
                        "{marker}{}. {} ({})",
                        number + 1,
                        summary.title,
                        summary.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            Err(error) => println!("could not list conversations: {error}"),
        }
    }

    async fn create_conversation(&self, title: &str) {
        match self.conversations.create_conversation(title).await {
            Ok(detail) => println!("opened \"{}\"", detail.title),
            Err(error) => println!("could not create conversation: {error}"),
        }
    }

    async fn open_conversation(&self, token: &str) {
        let Some(conversation_id) = self.resolve_conversation(token).await else {
            println!("no conversation matches \"{token}\"");
            return;
        };
        match self.conversations.select_conversation(conversation_id).await {
            Ok(detail) => {
                println!("-- {} --", detail.title);
                for entry in &detail.entries {
                    println!("{}", render_entry(entry));
                }
            }
            Err(error) => println!("could not open conversation: {error}"),
        }
    }

    async fn delete_conversation(&self, token: &str) {
        let Some(conversation_id) = self.resolve_conversation(token).await else {
            println!("no conversation matches \"{token}\"");
            return;
        };
        match self.conversations.delete_conversation(conversation_id).await {
            Ok(()) => println!("conversation deleted"),
            Err(error) => println!("could not delete conversation: {error}"),
        }
    }

    async fn send_draft(&mut self) {
        let Some(conversation_id) = self.conversations.selected_id().await else {
            println!("no conversation open; /new or /open one first");
            return;
        };
        let text = self.ui.take_message_draft();
        self.ui.set_sending(true);
        let outcome = self.conversations.send_message(conversation_id, &text).await;
        self.ui.set_sending(false);
        report_send(outcome);
    }

    async fn retry_send(&self) {
        let Some(conversation_id) = self.conversations.selected_id().await else {
            println!("no conversation open");
            return;
        };
        report_send(self.conversations.retry_failed_send(conversation_id).await);
    }

    async fn discard_failed(&self) {
        let Some(conversation_id) = self.conversations.selected_id().await else {
            println!("no conversation open");
            return;
        };
        let dropped = self.conversations.discard_failed(conversation_id).await;
        println!("dropped {dropped} failed message(s)");
    }

    async fn list_tasks(&self) {
        match self.tasks.list_tasks().await {
            Ok(tasks) if tasks.is_empty() => println!("no tasks; type a title to add one"),
            Ok(tasks) => {
                for (number, task) in tasks.iter().enumerate() {
                    println!("{}", render_task(number + 1, task));
                }
            }
            Err(error) => println!("could not list tasks: {error}"),
        }
    }

    async fn add_task_from_draft(&mut self) {
        let (title, description) = self.ui.take_task_draft();
        let description = (!description.is_empty()).then_some(description.as_str());
        match self.tasks.create_task(&title, description, None).await {
            Ok(CreateOutcome::Created(task)) => println!("added \"{}\"", task.title),
            Ok(CreateOutcome::Skipped) => println!("a task needs a title"),
            Err(error) => println!("could not add task: {error}"),
        }
    }

    async fn toggle_task(&self, number: usize, completed: bool) {
        let Some(task_id) = self.task_by_number(number).await else {
            println!("no task #{number}");
            return;
        };
        match self.tasks.toggle_completion(task_id, completed).await {
            Ok(true) => self.list_tasks().await,
            Ok(false) => println!("a newer change to that task already applied"),
            Err(error) => println!("could not update task: {error}"),
        }
    }

    async fn delete_task(&self, token: &str) {
        let Some(task_id) = self.resolve_task(token).await else {
            println!("no task matches \"{token}\"");
            return;
        };
        match self.tasks.delete_task(task_id).await {
            Ok(()) => println!("task deleted"),
            Err(error) => println!("could not delete task: {error}"),
        }
    }

    /// Accepts either a raw id or a 1-based number from the last listing.
    async fn resolve_conversation(&self, token: &str) -> Option<ConversationId> {
        if let Ok(conversation_id) = token.parse::<ConversationId>() {
            return Some(conversation_id);
        }
        let index = token.parse::<usize>().ok()?.checked_sub(1)?;
        self.conversations
            .summaries()
            .await
            .get(index)
            .map(|summary| summary.id)
    }

    async fn resolve_task(&self, token: &str) -> Option<TaskId> {
        if let Ok(task_id) = token.parse::<TaskId>() {
            return Some(task_id);
        }
        self.task_by_number(token.parse().ok()?).await
    }

    async fn task_by_number(&self, number: usize) -> Option<TaskId> {
        let index = number.checked_sub(1)?;
        self.tasks.tasks().await.get(index).map(|task| task.id)
    }
}

fn report_send(outcome: Result<SendOutcome, StoreError>) {
    match outcome {
        Ok(SendOutcome::Delivered(exchange)) => {
            println!("assistant: {}", exchange.ai_message.content);
        }
        Ok(SendOutcome::Skipped(reason)) => println!("{}", skip_reason_text(reason)),
        Err(error) => println!("send failed: {error} (/retry to resubmit, /discard to drop)"),
    }
}

fn skip_reason_text(reason: SendSkipReason) -> &'static str {
    match reason {
        SendSkipReason::EmptyText => "nothing to send",
        SendSkipReason::NotSelected => "that conversation is no longer open",
        SendSkipReason::NothingToRetry => "no failed message to retry",
    }
}

fn render_entry(entry: &MessageEntry) -> String {
    let speaker = match entry.message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    let marker = match entry.delivery {
        DeliveryState::Pending => " [sending]",
        DeliveryState::Failed => " [failed]",
        DeliveryState::Confirmed => "",
    };
    format!("{speaker}: {}{marker}", entry.message.content)
}

fn render_task(number: usize, task: &Task) -> String {
    let checkbox = if task.completed { "[x]" } else { "[ ]" };
    match &task.description {
        Some(description) => format!("{number}. {checkbox} {} - {description}", task.title),
        None => format!("{number}. {checkbox} {}", task.title),
    }
}

fn print_help() {
    println!("modes:  /chat  /tasks");
    println!("chat:   type a message to send it to the open conversation");
    println!("        /list  /new [title]  /open <n>  /delete <n>  /retry  /discard");
    println!("tasks:  type a title to add a task, or /add <title> | <description>");
    println!("        /list  /done <n>  /undo <n>  /delete <n>");
    println!("other:  /health  /help  /quit");
}
