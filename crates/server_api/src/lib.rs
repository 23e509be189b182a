use std::sync::Arc;

use assistant::Responder;
use shared::{
    domain::{Conversation, ConversationId, ConversationSummary, Message, Task, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddMessageRequest, CreateConversationRequest, CreateTaskRequest, MessageExchange,
        StatusMessage, UpdateTaskRequest,
    },
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub responder: Arc<dyn Responder>,
}

pub async fn create_conversation(
    ctx: &ApiContext,
    request: CreateConversationRequest,
) -> Result<Conversation, ApiError> {
    let conversation = ctx
        .storage
        .create_conversation(&request.title)
        .await
        .map_err(internal)?;
    info!(conversation_id = %conversation.id, "conversation created");
    Ok(conversation)
}

pub async fn list_conversations(ctx: &ApiContext) -> Result<Vec<ConversationSummary>, ApiError> {
    ctx.storage.list_conversations().await.map_err(internal)
}

pub async fn get_conversation(
    ctx: &ApiContext,
    conversation_id: ConversationId,
) -> Result<Conversation, ApiError> {
    ctx.storage
        .get_conversation(conversation_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "Conversation not found"))
}

pub async fn delete_conversation(
    ctx: &ApiContext,
    conversation_id: ConversationId,
) -> Result<StatusMessage, ApiError> {
    let removed = ctx
        .storage
        .delete_conversation(conversation_id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(ApiError::new(ErrorCode::NotFound, "Conversation not found"));
    }
    info!(conversation_id = %conversation_id, "conversation deleted");
    Ok(StatusMessage::new("Conversation deleted"))
}

/// Appends the user's message, asks the responder for a reply with the
/// full history as context, and persists both entries.
pub async fn add_message(
    ctx: &ApiContext,
    conversation_id: ConversationId,
    request: AddMessageRequest,
) -> Result<MessageExchange, ApiError> {
    let conversation = ctx
        .storage
        .get_conversation(conversation_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "Conversation not found"))?;

    let user_message = Message::user(request.message);
    let mut history = conversation.messages;
    history.push(user_message.clone());

    let ai_message = ctx.responder.respond(&history).await.map_err(internal)?;

    let appended = ctx
        .storage
        .append_messages(conversation_id, &[user_message.clone(), ai_message.clone()])
        .await
        .map_err(internal)?;
    if !appended {
        return Err(ApiError::new(ErrorCode::NotFound, "Conversation not found"));
    }

    info!(
        conversation_id = %conversation_id,
        history_len = history.len(),
        "message exchange recorded"
    );
    Ok(MessageExchange {
        user_message,
        ai_message,
    })
}

pub async fn create_task(ctx: &ApiContext, request: CreateTaskRequest) -> Result<Task, ApiError> {
    let task = ctx
        .storage
        .create_task(
            &request.title,
            request.description.as_deref(),
            request.due_date,
        )
        .await
        .map_err(internal)?;
    info!(task_id = %task.id, "task created");
    Ok(task)
}

pub async fn list_tasks(ctx: &ApiContext) -> Result<Vec<Task>, ApiError> {
    ctx.storage.list_tasks().await.map_err(internal)
}

pub async fn update_task(
    ctx: &ApiContext,
    task_id: TaskId,
    request: UpdateTaskRequest,
) -> Result<StatusMessage, ApiError> {
    let found = ctx
        .storage
        .update_task(task_id, &request)
        .await
        .map_err(internal)?;
    if !found {
        return Err(ApiError::new(ErrorCode::NotFound, "Task not found"));
    }
    Ok(StatusMessage::new("Task updated"))
}

pub async fn delete_task(ctx: &ApiContext, task_id: TaskId) -> Result<StatusMessage, ApiError> {
    let removed = ctx.storage.delete_task(task_id).await.map_err(internal)?;
    if !removed {
        return Err(ApiError::new(ErrorCode::NotFound, "Task not found"));
    }
    Ok(StatusMessage::new("Task deleted"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
