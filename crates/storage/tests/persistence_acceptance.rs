use shared::domain::Message;
use shared::protocol::UpdateTaskRequest;
use storage::Storage;

#[tokio::test]
async fn state_survives_reopening_the_database_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("assistant.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("open");
    let conversation = storage
        .create_conversation("New Conversation")
        .await
        .expect("conversation");
    storage
        .append_messages(
            conversation.id,
            &[Message::user("hello"), Message::assistant("hi there")],
        )
        .await
        .expect("append");
    let task = storage
        .create_task("Write report", None, None)
        .await
        .expect("task");
    storage
        .update_task(task.id, &UpdateTaskRequest::completion(true))
        .await
        .expect("update");
    drop(storage);

    let reopened = Storage::new(&database_url).await.expect("reopen");

    let fetched = reopened
        .get_conversation(conversation.id)
        .await
        .expect("get")
        .expect("conversation persisted");
    assert_eq!(fetched.title, "New Conversation");
    assert_eq!(fetched.messages.len(), 2);
    assert_eq!(fetched.messages[1], Message::assistant("hi there"));

    let tasks = reopened.list_tasks().await.expect("tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert!(tasks[0].completed);
}
