use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("assistant_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("assistant.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn created_conversation_starts_empty() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let conversation = storage
        .create_conversation("New Conversation")
        .await
        .expect("create");

    assert_eq!(conversation.title, "New Conversation");
    assert!(conversation.messages.is_empty());

    let fetched = storage
        .get_conversation(conversation.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(fetched.id, conversation.id);
    assert!(fetched.messages.is_empty());
}

#[tokio::test]
async fn lists_conversations_most_recently_updated_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let older = storage.create_conversation("older").await.expect("older");
    let newer = storage.create_conversation("newer").await.expect("newer");

    let listed = storage.list_conversations().await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer.id);
    assert_eq!(listed[1].id, older.id);

    storage
        .append_messages(older.id, &[Message::user("bump")])
        .await
        .expect("append");

    let relisted = storage.list_conversations().await.expect("relist");
    assert_eq!(relisted[0].id, older.id, "append should bump updated_at");
    assert!(relisted[0].updated_at > listed[1].updated_at);
}

#[tokio::test]
async fn appends_messages_in_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let conversation = storage.create_conversation("chat").await.expect("create");

    let appended = storage
        .append_messages(
            conversation.id,
            &[Message::user("hello"), Message::assistant("hi there")],
        )
        .await
        .expect("append");
    assert!(appended);

    let fetched = storage
        .get_conversation(conversation.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(fetched.messages.len(), 2);
    assert_eq!(fetched.messages[0], Message::user("hello"));
    assert_eq!(fetched.messages[1], Message::assistant("hi there"));
}

#[tokio::test]
async fn append_to_unknown_conversation_reports_missing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let appended = storage
        .append_messages(ConversationId::generate(), &[Message::user("lost")])
        .await
        .expect("append");
    assert!(!appended);
}

#[tokio::test]
async fn deletes_conversation_with_its_messages() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let conversation = storage.create_conversation("doomed").await.expect("create");
    storage
        .append_messages(conversation.id, &[Message::user("hello")])
        .await
        .expect("append");

    let removed = storage
        .delete_conversation(conversation.id)
        .await
        .expect("delete");
    assert!(removed);
    assert!(storage
        .get_conversation(conversation.id)
        .await
        .expect("get")
        .is_none());

    let removed_again = storage
        .delete_conversation(conversation.id)
        .await
        .expect("second delete");
    assert!(!removed_again);
}

#[tokio::test]
async fn creates_task_with_completed_unset() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let task = storage
        .create_task("Write report", Some("quarterly numbers"), None)
        .await
        .expect("create");

    assert_eq!(task.title, "Write report");
    assert_eq!(task.description.as_deref(), Some("quarterly numbers"));
    assert!(!task.completed);

    let listed = storage.list_tasks().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, task.id);
}

#[tokio::test]
async fn lists_tasks_in_creation_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage.create_task("first", None, None).await.expect("a");
    let second = storage.create_task("second", None, None).await.expect("b");

    let listed = storage.list_tasks().await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);
}

#[tokio::test]
async fn partial_update_leaves_other_fields_alone() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let task = storage
        .create_task("Call dentist", Some("ask about Friday"), None)
        .await
        .expect("create");

    let found = storage
        .update_task(task.id, &UpdateTaskRequest::completion(true))
        .await
        .expect("update");
    assert!(found);

    let listed = storage.list_tasks().await.expect("list");
    assert!(listed[0].completed);
    assert_eq!(listed[0].title, "Call dentist");
    assert_eq!(listed[0].description.as_deref(), Some("ask about Friday"));
}

#[tokio::test]
async fn update_matching_current_value_still_reports_found() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let task = storage.create_task("idempotent", None, None).await.expect("create");

    storage
        .update_task(task.id, &UpdateTaskRequest::completion(true))
        .await
        .expect("first update");
    let found = storage
        .update_task(task.id, &UpdateTaskRequest::completion(true))
        .await
        .expect("second update");
    assert!(found, "setting the stored value again is not a missing task");
}

#[tokio::test]
async fn update_of_unknown_task_reports_missing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let found = storage
        .update_task(TaskId::generate(), &UpdateTaskRequest::completion(true))
        .await
        .expect("update");
    assert!(!found);
}

#[tokio::test]
async fn deletes_task_once() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let task = storage.create_task("done soon", None, None).await.expect("create");

    assert!(storage.delete_task(task.id).await.expect("delete"));
    assert!(!storage.delete_task(task.id).await.expect("second delete"));
    assert!(storage.list_tasks().await.expect("list").is_empty());
}

#[tokio::test]
async fn due_date_round_trips() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let due = Utc::now() + chrono::Duration::days(3);
    let task = storage
        .create_task("file taxes", None, Some(due))
        .await
        .expect("create");

    let listed = storage.list_tasks().await.expect("list");
    assert_eq!(listed[0].id, task.id);
    assert_eq!(listed[0].due_date, Some(due));
}
