use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{Task, TaskId},
    protocol::{CreateTaskRequest, UpdateTaskRequest},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{error::StoreError, gateway::BackendGateway};

/// Result of a create that did not error: the server's task, or a skip
/// because the title was blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Task),
    Skipped,
}

struct TaskState {
    tasks: Vec<Task>,
    // Issue-order stamps per task id; a toggle only applies its local flag
    // if no newer toggle was issued for the same id while it was out.
    completion_stamps: HashMap<TaskId, u64>,
    next_stamp: u64,
}

/// Owns the flat task collection. Creates and deletes apply locally only on
/// server confirmation; completion toggles apply once the request has been
/// issued and answered, with "last request issued wins" when toggles on the
/// same task overlap.
pub struct TaskStore {
    gateway: Arc<dyn BackendGateway>,
    inner: Mutex<TaskState>,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            inner: Mutex::new(TaskState {
                tasks: Vec::new(),
                completion_stamps: HashMap::new(),
                next_stamp: 0,
            }),
        })
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.inner.lock().await.tasks.clone()
    }

    /// Replaces the local collection with the server's. On error the prior
    /// collection is left untouched. A replace also clears toggle stamps:
    /// the fresh list is authoritative, so any still-outstanding toggle
    /// resolves without touching it.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.gateway.list_tasks().await?;
        let mut state = self.inner.lock().await;
        state.tasks = tasks.clone();
        state.completion_stamps.clear();
        Ok(tasks)
    }

    /// Creates a task from compose fields. A blank title short-circuits to
    /// `Skipped` without a request; a blank description is sent as absent.
    pub async fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<CreateOutcome, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(CreateOutcome::Skipped);
        }

        let request = CreateTaskRequest {
            title: title.to_string(),
            description: description
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            due_date,
        };
        let task = self.gateway.create_task(&request).await?;
        info!(task_id = %task.id, "task created");

        let mut state = self.inner.lock().await;
        state.tasks.push(task.clone());
        Ok(CreateOutcome::Created(task))
    }

    /// Sends the new `completed` value, then mirrors it locally without
    /// re-reading the body. Returns whether this call's value was applied:
    /// a toggle that resolves after a newer toggle was issued for the same
    /// task leaves the newer value in place and reports `false`.
    pub async fn toggle_completion(
        &self,
        task_id: TaskId,
        completed: bool,
    ) -> Result<bool, StoreError> {
        let stamp = {
            let mut state = self.inner.lock().await;
            let stamp = state.next_stamp;
            state.next_stamp += 1;
            state.completion_stamps.insert(task_id, stamp);
            stamp
        };

        let request = UpdateTaskRequest::completion(completed);
        self.gateway.update_task(task_id, &request).await?;

        let mut state = self.inner.lock().await;
        if state.completion_stamps.get(&task_id) != Some(&stamp) {
            debug!(task_id = %task_id, "stale toggle superseded by a newer request");
            return Ok(false);
        }
        if let Some(task) = state.tasks.iter_mut().find(|task| task.id == task_id) {
            task.completed = completed;
        }
        Ok(true)
    }

    /// Deletes on the server first; only a confirmed delete removes the
    /// task locally. Removing an id the local collection no longer holds is
    /// a no-op.
    pub async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.gateway.delete_task(task_id).await?;

        let mut state = self.inner.lock().await;
        state.tasks.retain(|task| task.id != task_id);
        state.completion_stamps.remove(&task_id);
        info!(task_id = %task_id, "task deleted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/tasks_tests.rs"]
mod tests;
