use super::*;

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone)]
struct CompletionServerState {
    status: axum::http::StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
}

async fn handle_completion(
    State(state): State<CompletionServerState>,
    Json(payload): Json<serde_json::Value>,
) -> (axum::http::StatusCode, String) {
    state.requests.lock().await.push(payload);
    (state.status, state.body.clone())
}

async fn spawn_completion_server(
    status: axum::http::StatusCode,
    body: String,
) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = CompletionServerState {
        status,
        body,
        requests: Arc::clone(&requests),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(handle_completion))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v1/chat/completions"), requests)
}

fn responder_against(url: String, api_key: Option<&str>) -> OpenAiResponder {
    OpenAiResponder::new(OpenAiOptions {
        api_key: api_key.map(str::to_string),
        api_url: url,
        ..OpenAiOptions::default()
    })
}

#[test]
fn keyword_replies_cover_the_help_topics() {
    let responder = RuleBasedResponder;
    assert!(responder
        .reply_to("I have way too many tasks")
        .starts_with("To help organize your tasks"));
    assert!(responder
        .reply_to("I just cannot focus today")
        .starts_with("For better focus"));
    assert!(responder
        .reply_to("The deadline is tomorrow")
        .starts_with("To manage deadlines"));
    assert!(responder
        .reply_to("Everything is so overwhelming, much stress")
        .starts_with("When feeling overwhelmed"));
    assert!(responder
        .reply_to("I forgot the meeting again")
        .starts_with("To help with memory"));
    assert!(responder
        .reply_to("Hello over there")
        .starts_with("Hello! I'm your AI assistant."));
    assert!(responder
        .reply_to("qqq")
        .starts_with("I understand you need help."));
}

#[test]
fn keyword_match_is_case_insensitive() {
    let responder = RuleBasedResponder;
    assert!(responder
        .reply_to("HELP ME ORGANIZE MY TODO LIST")
        .starts_with("To help organize your tasks"));
}

#[tokio::test]
async fn rule_based_responder_answers_last_user_message() {
    let history = vec![
        Message::user("hello"),
        Message::assistant("Hello! I'm your AI assistant."),
        Message::user("my deadline slipped"),
    ];
    let reply = RuleBasedResponder.respond(&history).await.expect("reply");
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.content.starts_with("To manage deadlines"));
}

#[tokio::test]
async fn rule_based_responder_falls_back_when_log_does_not_end_with_user() {
    let history = vec![Message::assistant("unprompted")];
    let reply = RuleBasedResponder.respond(&history).await.expect("reply");
    assert!(reply.content.starts_with("I understand you need help."));
}

#[tokio::test]
async fn missing_api_key_uses_rule_based_replies() {
    let responder = OpenAiResponder::new(OpenAiOptions::default());
    let reply = responder
        .respond(&[Message::user("hello")])
        .await
        .expect("reply");
    assert_eq!(reply.role, Role::Assistant);
    assert!(reply.content.starts_with("Hello! I'm your AI assistant."));
}

#[tokio::test]
async fn forwards_history_and_returns_model_reply() {
    let body = serde_json::json!({
        "choices": [{
            "message": {"role": "assistant", "content": "mocked reply"}
        }]
    })
    .to_string();
    let (url, requests) = spawn_completion_server(axum::http::StatusCode::OK, body).await;
    let responder = responder_against(url, Some("test-key"));

    let history = vec![
        Message::user("hello"),
        Message::assistant("Hello!"),
        Message::user("now what"),
    ];
    let reply = responder.respond(&history).await.expect("reply");
    assert_eq!(reply, Message::assistant("mocked reply"));

    let recorded = requests.lock().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0]["model"], serde_json::json!("gpt-3.5-turbo"));
    assert_eq!(recorded[0]["temperature"], serde_json::json!(0.7));
    assert_eq!(recorded[0]["max_tokens"], serde_json::json!(1000));
    assert_eq!(
        recorded[0]["messages"],
        serde_json::json!([
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "Hello!"},
            {"role": "user", "content": "now what"},
        ])
    );
}

#[tokio::test]
async fn quota_errors_degrade_to_prefixed_rule_based_reply() {
    let (url, _requests) = spawn_completion_server(
        axum::http::StatusCode::TOO_MANY_REQUESTS,
        r#"{"error": {"code": "insufficient_quota"}}"#.to_string(),
    )
    .await;
    let responder = responder_against(url, Some("test-key"));

    let reply = responder
        .respond(&[Message::user("hello")])
        .await
        .expect("reply");
    assert!(reply
        .content
        .starts_with("I'm sorry, but there's an API quota limitation."));
    assert!(reply.content.contains("Hello! I'm your AI assistant."));
}

#[tokio::test]
async fn non_quota_errors_return_fixed_apology() {
    let (url, _requests) = spawn_completion_server(
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        "upstream exploded".to_string(),
    )
    .await;
    let responder = responder_against(url, Some("test-key"));

    let reply = responder
        .respond(&[Message::user("hello")])
        .await
        .expect("reply");
    assert_eq!(
        reply.content,
        "I'm having trouble connecting to my brain. Please try again later."
    );
}

#[tokio::test]
async fn transport_failures_degrade_to_prefixed_rule_based_reply() {
    // Bind then drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let responder = responder_against(
        format!("http://{addr}/v1/chat/completions"),
        Some("test-key"),
    );
    let reply = responder
        .respond(&[Message::user("my deadline slipped")])
        .await
        .expect("reply");
    assert!(reply
        .content
        .starts_with("I encountered an error while processing your request."));
    assert!(reply.content.contains("To manage deadlines"));
}
