use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::{
    domain::{Conversation, ConversationId, ConversationSummary, Message, Role, Task, TaskId},
    protocol::UpdateTaskRequest,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id         TEXT PRIMARY KEY,
                title      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure conversations table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure messages table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT,
                completed   INTEGER NOT NULL DEFAULT 0,
                due_date    TEXT,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure tasks table exists")?;

        Ok(())
    }

    pub async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let id = ConversationId::generate();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id,
            title: title.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Most recently updated first, mirroring what the conversation list
    /// shows to the user.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, updated_at FROM conversations ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(ConversationSummary {
                id: ConversationId(Uuid::parse_str(&row.get::<String, _>(0))?),
                title: row.get::<String, _>(1),
                updated_at: row.get::<DateTime<Utc>, _>(2),
            });
        }
        Ok(summaries)
    }

    pub async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let message_rows = sqlx::query(
            "SELECT role, content FROM messages WHERE conversation_id = ? ORDER BY id ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Conversation {
            id: ConversationId(Uuid::parse_str(&row.get::<String, _>(0))?),
            title: row.get::<String, _>(1),
            messages: message_rows.iter().map(message_from_row).collect(),
            created_at: row.get::<DateTime<Utc>, _>(2),
            updated_at: row.get::<DateTime<Utc>, _>(3),
        }))
    }

    /// Appends entries to a conversation's log and bumps its updated_at.
    /// Returns false when the conversation does not exist; nothing is
    /// written in that case.
    pub async fn append_messages(
        &self,
        conversation_id: ConversationId,
        messages: &[Message],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if touched == 0 {
            return Ok(false);
        }

        for message in messages {
            sqlx::query("INSERT INTO messages (conversation_id, role, content) VALUES (?, ?, ?)")
                .bind(conversation_id.to_string())
                .bind(role_to_str(message.role))
                .bind(message.content.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Returns whether a conversation was actually removed.
    pub async fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    pub async fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let id = TaskId::generate();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tasks (id, title, description, completed, due_date, created_at)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(title)
        .bind(description)
        .bind(due_date)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Task {
            id,
            title: title.to_string(),
            description: description.map(str::to_string),
            completed: false,
            due_date,
            created_at: now,
        })
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, title, description, completed, due_date, created_at
             FROM tasks
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(task_from_row(&row)?);
        }
        Ok(tasks)
    }

    /// Applies a partial update; absent fields keep their stored value.
    /// Returns false when no task has the given id.
    pub async fn update_task(&self, id: TaskId, changes: &UpdateTaskRequest) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE tasks SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                completed = COALESCE(?, completed)
             WHERE id = ?",
        )
        .bind(changes.title.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.completed)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Returns whether a task was actually removed.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn message_from_row(row: &SqliteRow) -> Message {
    let role = match row.get::<String, _>(0).as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };
    Message {
        role,
        content: row.get::<String, _>(1),
    }
}

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: TaskId(Uuid::parse_str(&row.get::<String, _>(0))?),
        title: row.get::<String, _>(1),
        description: row.get::<Option<String>, _>(2),
        completed: row.get::<bool, _>(3),
        due_date: row.get::<Option<DateTime<Utc>>, _>(4),
        created_at: row.get::<DateTime<Utc>, _>(5),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
