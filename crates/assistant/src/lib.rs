use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use shared::domain::{Message, Role};

/// Produces the assistant's side of a conversation. Implementations are
/// expected to always return a reply; degraded answers are still answers.
#[async_trait]
pub trait Responder: Send + Sync {
    /// `history` is the full conversation log ending with the newest user
    /// message.
    async fn respond(&self, history: &[Message]) -> anyhow::Result<Message>;
}

/// Deterministic replies keyed on what the user seems to be asking about.
/// Serves as the standalone responder when no API key is configured and as
/// the degraded path when the remote model is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedResponder;

impl RuleBasedResponder {
    pub fn reply_to(&self, user_message: &str) -> String {
        let message = user_message.to_lowercase();

        if contains_any(&message, &["task", "todo", "to-do", "organize"]) {
            "To help organize your tasks, try breaking them down into smaller steps. \
             I recommend starting with just 1-3 tasks that are most important today."
                .to_string()
        } else if contains_any(&message, &["focus", "concentrate", "distract"]) {
            "For better focus, try the Pomodoro technique: 25 minutes of focused work \
             followed by a 5-minute break. Also, minimize distractions by silencing \
             notifications."
                .to_string()
        } else if contains_any(&message, &["deadline", "late", "procrastinate"]) {
            "To manage deadlines, try setting earlier personal deadlines with small \
             rewards. Breaking the project into smaller milestones can also help \
             prevent procrastination."
                .to_string()
        } else if contains_any(&message, &["overwhelm", "stress", "anxious"]) {
            "When feeling overwhelmed, pause and take a few deep breaths. Try writing \
             everything down that's on your mind, then prioritize only what needs \
             attention today."
                .to_string()
        } else if contains_any(&message, &["forgot", "remember", "memory"]) {
            "To help with memory, try using external systems like calendar alerts, \
             sticky notes, or apps with reminders. Writing things down immediately is \
             also helpful."
                .to_string()
        } else if contains_any(&message, &["hello", "hi", "hey"]) {
            "Hello! I'm your AI assistant. I can help you with organization, focus, \
             task management, and more. What would you like assistance with today?"
                .to_string()
        } else {
            "I understand you need help. Could you share more specific details about \
             what you're looking for assistance with? I can help with organization, \
             focus, breaking down tasks, and managing ADHD challenges."
                .to_string()
        }
    }
}

#[async_trait]
impl Responder for RuleBasedResponder {
    async fn respond(&self, history: &[Message]) -> anyhow::Result<Message> {
        Ok(Message::assistant(self.reply_to(last_user_content(history))))
    }
}

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}

fn last_user_content(history: &[Message]) -> &str {
    history
        .last()
        .filter(|message| message.role == Role::User)
        .map(|message| message.content.as_str())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OpenAiOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Chat-completion backed responder. Any failure talking to the remote
/// model degrades to [`RuleBasedResponder`] output rather than erroring,
/// so a send never fails on the assistant's account.
pub struct OpenAiResponder {
    http: Client,
    options: OpenAiOptions,
    fallback: RuleBasedResponder,
}

enum CompletionError {
    Status { status: StatusCode, body: String },
    Request(anyhow::Error),
}

impl OpenAiResponder {
    pub fn new(options: OpenAiOptions) -> Self {
        Self {
            http: Client::new(),
            options,
            fallback: RuleBasedResponder,
        }
    }

    async fn request_completion(
        &self,
        api_key: &str,
        history: &[Message],
    ) -> Result<Message, CompletionError> {
        let payload = json!({
            "model": self.options.model,
            "messages": history,
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens,
        });

        let response = self
            .http
            .post(&self.options.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(self.options.timeout)
            .send()
            .await
            .map_err(|err| CompletionError::Request(err.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Request(err.into()))?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CompletionError::Request(anyhow!("completion had no choices")))
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(&self, history: &[Message]) -> anyhow::Result<Message> {
        let Some(api_key) = self.options.api_key.as_deref() else {
            warn!("no OpenAI API key configured, using rule-based replies");
            return Ok(Message::assistant(
                self.fallback.reply_to(last_user_content(history)),
            ));
        };

        match self.request_completion(api_key, history).await {
            Ok(message) => Ok(message),
            Err(CompletionError::Status { status, body }) => {
                error!(%status, "OpenAI API error: {body}");
                if body.contains("quota") || body.contains("insufficient_quota") {
                    Ok(Message::assistant(format!(
                        "I'm sorry, but there's an API quota limitation. Using \
                         simplified responses instead.\n\n{}",
                        self.fallback.reply_to(last_user_content(history))
                    )))
                } else {
                    Ok(Message::assistant(
                        "I'm having trouble connecting to my brain. Please try again later.",
                    ))
                }
            }
            Err(CompletionError::Request(err)) => {
                error!("error calling OpenAI API: {err:#}");
                Ok(Message::assistant(format!(
                    "I encountered an error while processing your request. Using \
                     simplified responses instead.\n\n{}",
                    self.fallback.reply_to(last_user_content(history))
                )))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
