//! Task lifecycle: creation, dispatch to registered executors, ordered
//! progress/event emission, and cooperative cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use newsdesk_common::{NewsdeskError, Result, TaskEventType, TaskStatus};
use newsdesk_store::{Store, Task};

use crate::broadcast::{TaskHub, TaskStreamEvent};

/// Handle passed to executors: the cooperation points for progress, events,
/// and cancellation. Executors must sample `is_cancelled` between logical
/// steps.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: i64,
    store: Store,
    hub: Arc<TaskHub>,
    cancel: Arc<AtomicBool>,
}

impl TaskContext {
    /// Persist a progress row and append a `progress` event.
    pub async fn progress(
        &self,
        current: i32,
        total: i32,
        message: Option<&str>,
        intermediate_result: Option<serde_json::Value>,
    ) -> Result<()> {
        self.store
            .tasks
            .update_progress(self.task_id, current, total, intermediate_result.as_ref())
            .await?;

        let mut data = serde_json::json!({ "current": current, "total": total });
        if let Some(message) = message {
            data["message"] = serde_json::Value::String(message.to_string());
        }
        if let Some(intermediate) = intermediate_result {
            data["intermediate_result"] = intermediate;
        }
        self.event(TaskEventType::Progress, Some(data)).await
    }

    /// Append a typed event to the persistent log and the live stream.
    pub async fn event(
        &self,
        event_type: TaskEventType,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        self.store
            .tasks
            .add_event(self.task_id, event_type, data.clone())
            .await?;
        self.hub
            .publish(TaskStreamEvent {
                task_id: self.task_id,
                event_type: event_type.to_string(),
                data,
                created_at: Utc::now(),
            })
            .await;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// A unit-of-work implementation, registered under its task type tag.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: &TaskContext, params: &serde_json::Value)
        -> Result<serde_json::Value>;
}

pub struct TaskManager {
    store: Store,
    hub: Arc<TaskHub>,
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
    cancel_flags: RwLock<HashMap<i64, Arc<AtomicBool>>>,
}

impl TaskManager {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            hub: Arc::new(TaskHub::new()),
            executors: RwLock::new(HashMap::new()),
            cancel_flags: RwLock::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> Arc<TaskHub> {
        self.hub.clone()
    }

    pub async fn register(&self, task_type: &str, executor: Arc<dyn TaskExecutor>) {
        self.executors
            .write()
            .await
            .insert(task_type.to_string(), executor);
    }

    /// Create a pending task and log its `created` event.
    pub async fn create(
        &self,
        task_type: &str,
        title: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Task> {
        {
            let executors = self.executors.read().await;
            if !executors.contains_key(task_type) {
                return Err(NewsdeskError::Validation(format!(
                    "unknown task type: {task_type}"
                )));
            }
        }

        let task = self.store.tasks.create(task_type, title, params).await?;
        self.store
            .tasks
            .add_event(task.id, TaskEventType::Created, None)
            .await?;
        info!(task_id = task.id, task_type, "task created");
        Ok(task)
    }

    /// Run a pending task to completion on the current tokio task.
    pub async fn run(&self, task_id: i64) -> Result<()> {
        let task = self
            .store
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| NewsdeskError::NotFound(format!("task {task_id}")))?;

        let executor = {
            let executors = self.executors.read().await;
            executors.get(&task.task_type).cloned().ok_or_else(|| {
                NewsdeskError::Validation(format!("unknown task type: {}", task.task_type))
            })?
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .write()
            .await
            .insert(task_id, cancel.clone());

        let ctx = TaskContext {
            task_id,
            store: self.store.clone(),
            hub: self.hub.clone(),
            cancel: cancel.clone(),
        };

        self.store
            .tasks
            .update_status(task_id, TaskStatus::Running, None)
            .await?;
        ctx.event(TaskEventType::Started, None).await?;

        let params = task.params.clone().unwrap_or(serde_json::Value::Null);
        let outcome = executor.execute(&ctx, &params).await;

        let result = match outcome {
            Ok(result) => {
                if cancel.load(Ordering::Relaxed) {
                    self.finish(&ctx, TaskStatus::Cancelled, None).await?;
                } else {
                    self.store.tasks.update_result(task_id, &result).await?;
                    self.finish(&ctx, TaskStatus::Completed, None).await?;
                }
                Ok(())
            }
            Err(NewsdeskError::Cancelled) => {
                self.finish(&ctx, TaskStatus::Cancelled, None).await?;
                Ok(())
            }
            Err(e) => {
                error!(task_id, error = %e, "task failed");
                self.finish(&ctx, TaskStatus::Failed, Some(&e.to_string())).await?;
                Err(e)
            }
        };

        self.cancel_flags.write().await.remove(&task_id);
        self.hub.remove(task_id).await;
        result
    }

    /// Run a task on a background tokio task.
    pub fn spawn(self: &Arc<Self>, task_id: i64) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.run(task_id).await {
                warn!(task_id, error = %e, "background task ended with error");
            }
        });
    }

    /// Request cooperative cancellation. Returns false when the task is not
    /// currently running.
    pub async fn cancel(&self, task_id: i64) -> Result<bool> {
        let flags = self.cancel_flags.read().await;
        match flags.get(&task_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                info!(task_id, "cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn finish(
        &self,
        ctx: &TaskContext,
        status: TaskStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.store
            .tasks
            .update_status(ctx.task_id, status, error)
            .await?;
        let event_type = match status {
            TaskStatus::Completed => TaskEventType::Completed,
            TaskStatus::Cancelled => TaskEventType::Cancelled,
            _ => TaskEventType::Failed,
        };
        let data = error.map(|e| serde_json::json!({ "error": e }));
        ctx.event(event_type, data).await?;
        info!(task_id = ctx.task_id, status = %status, "task finished");
        Ok(())
    }
}
