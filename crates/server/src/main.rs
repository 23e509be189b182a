use std::{net::SocketAddr, sync::Arc, time::Duration};

use assistant::{OpenAiOptions, OpenAiResponder};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{Conversation, ConversationId, ConversationSummary, Task, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddMessageRequest, CreateConversationRequest, CreateTaskRequest, MessageExchange,
        StatusMessage, UpdateTaskRequest,
    },
};
use storage::Storage;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

mod config;

use config::{load_settings, prepare_database_url, Settings};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    storage.health_check().await?;

    if settings.openai_api_key.is_none() {
        warn!("no OpenAI API key configured; replies fall back to rule-based responses");
    }
    let responder = OpenAiResponder::new(openai_options(&settings));

    let api = ApiContext {
        storage,
        responder: Arc::new(responder),
    };
    let app = build_router(Arc::new(AppState { api }));

    // The browser client is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = app.layer(cors);

    let addr: SocketAddr = settings.bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn openai_options(settings: &Settings) -> OpenAiOptions {
    let mut options = OpenAiOptions {
        api_key: settings.openai_api_key.clone(),
        ..OpenAiOptions::default()
    };
    if let Some(api_url) = &settings.openai_api_url {
        options.api_url = api_url.clone();
    }
    if let Some(model) = &settings.openai_model {
        options.model = model.clone();
    }
    if let Some(seconds) = settings.openai_timeout_seconds {
        options.timeout = Duration::from_secs(seconds);
    }
    options
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api", get(health))
        .route("/api/conversations", post(http_create_conversation))
        .route("/api/conversations", get(http_list_conversations))
        .route(
            "/api/conversations/:conversation_id",
            get(http_get_conversation),
        )
        .route(
            "/api/conversations/:conversation_id",
            delete(http_delete_conversation),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            post(http_add_message),
        )
        .route("/api/tasks", post(http_create_task))
        .route("/api/tasks", get(http_list_tasks))
        .route("/api/tasks/:task_id", put(http_update_task))
        .route("/api/tasks/:task_id", delete(http_delete_task))
        .with_state(state)
}

fn error_response(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

async fn health() -> Json<StatusMessage> {
    Json(StatusMessage::new("AI Assistant API is running"))
}

async fn http_create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, (StatusCode, Json<ApiError>)> {
    let conversation = server_api::create_conversation(&state.api, req)
        .await
        .map_err(error_response)?;
    Ok(Json(conversation))
}

async fn http_list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConversationSummary>>, (StatusCode, Json<ApiError>)> {
    let summaries = server_api::list_conversations(&state.api)
        .await
        .map_err(error_response)?;
    Ok(Json(summaries))
}

async fn http_get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<Conversation>, (StatusCode, Json<ApiError>)> {
    let conversation = server_api::get_conversation(&state.api, conversation_id)
        .await
        .map_err(error_response)?;
    Ok(Json(conversation))
}

async fn http_delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<ApiError>)> {
    let status = server_api::delete_conversation(&state.api, conversation_id)
        .await
        .map_err(error_response)?;
    Ok(Json(status))
}

async fn http_add_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<ConversationId>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Json<MessageExchange>, (StatusCode, Json<ApiError>)> {
    let exchange = server_api::add_message(&state.api, conversation_id, req)
        .await
        .map_err(error_response)?;
    Ok(Json(exchange))
}

async fn http_create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, Json<ApiError>)> {
    let task = server_api::create_task(&state.api, req)
        .await
        .map_err(error_response)?;
    Ok(Json(task))
}

async fn http_list_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Task>>, (StatusCode, Json<ApiError>)> {
    let tasks = server_api::list_tasks(&state.api)
        .await
        .map_err(error_response)?;
    Ok(Json(tasks))
}

async fn http_update_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<TaskId>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<ApiError>)> {
    let status = server_api::update_task(&state.api, task_id, req)
        .await
        .map_err(error_response)?;
    Ok(Json(status))
}

async fn http_delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<StatusMessage>, (StatusCode, Json<ApiError>)> {
    let status = server_api::delete_task(&state.api, task_id)
        .await
        .map_err(error_response)?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant::RuleBasedResponder;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let api = ApiContext {
            storage,
            responder: Arc::new(RuleBasedResponder::default()),
        };
        build_router(Arc::new(AppState { api }))
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn health_route_reports_running_api() {
        let app = test_app().await;
        let request = Request::get("/api").body(Body::empty()).expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let status: StatusMessage = json_body(response).await;
        assert_eq!(status.message, "AI Assistant API is running");
    }

    #[tokio::test]
    async fn conversation_routes_cover_create_list_fetch_delete() {
        let app = test_app().await;

        let create = Request::post("/api/conversations")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "title": "Chat" }).to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(create).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let conversation: Conversation = json_body(response).await;
        assert_eq!(conversation.title, "Chat");

        let list = Request::get("/api/conversations")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(list).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let summaries: Vec<ConversationSummary> = json_body(response).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, conversation.id);

        let fetch = Request::get(format!("/api/conversations/{}", conversation.id))
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(fetch).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let remove = Request::delete(format!("/api/conversations/{}", conversation.id))
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(remove).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusMessage = json_body(response).await;
        assert_eq!(status.message, "Conversation deleted");

        let fetch_missing = Request::get(format!("/api/conversations/{}", conversation.id))
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch_missing).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn message_route_returns_user_and_assistant_pair() {
        let app = test_app().await;

        let create = Request::post("/api/conversations")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "title": "Help" }).to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(create).await.expect("response");
        let conversation: Conversation = json_body(response).await;

        let send = Request::post(format!("/api/conversations/{}/messages", conversation.id))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "message": "hello" }).to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(send).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let exchange: MessageExchange = json_body(response).await;
        assert_eq!(exchange.user_message.content, "hello");
        assert!(!exchange.ai_message.content.is_empty());

        let fetch = Request::get(format!("/api/conversations/{}", conversation.id))
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");
        let refreshed: Conversation = json_body(response).await;
        assert_eq!(refreshed.messages.len(), 2);
    }

    #[tokio::test]
    async fn message_route_rejects_unknown_conversation() {
        let app = test_app().await;

        let send = Request::post(format!(
            "/api/conversations/{}/messages",
            ConversationId::generate()
        ))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "message": "hi" }).to_string()))
        .expect("request");
        let response = app.oneshot(send).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ApiError = json_body(response).await;
        assert_eq!(error.message, "Conversation not found");
    }

    #[tokio::test]
    async fn malformed_conversation_id_is_rejected() {
        let app = test_app().await;

        let fetch = Request::get("/api/conversations/not-a-uuid")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(fetch).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn task_routes_cover_create_update_delete() {
        let app = test_app().await;

        let create = Request::post("/api/tasks")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "title": "Write report", "description": "quarterly numbers" })
                    .to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(create).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let task: Task = json_body(response).await;
        assert!(!task.completed);

        let update = Request::put(format!("/api/tasks/{}", task.id))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "completed": true }).to_string(),
            ))
            .expect("request");
        let response = app.clone().oneshot(update).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusMessage = json_body(response).await;
        assert_eq!(status.message, "Task updated");

        let list = Request::get("/api/tasks")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(list).await.expect("response");
        let tasks: Vec<Task> = json_body(response).await;
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].completed);

        let remove = Request::delete(format!("/api/tasks/{}", task.id))
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(remove).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusMessage = json_body(response).await;
        assert_eq!(status.message, "Task deleted");

        let update_missing = Request::put(format!("/api/tasks/{}", task.id))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "completed": false }).to_string(),
            ))
            .expect("request");
        let response = app.oneshot(update_missing).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ApiError = json_body(response).await;
        assert_eq!(error.message, "Task not found");
    }
}
