use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::types::{PipelineError, ScheduledTask, SchedulerError, TaskPayload, TaskStatus};

/// Work run for one task type. The payload is the task's verbatim payload.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn run(&self, payload: &TaskPayload) -> Result<(), PipelineError>;
}

/// Adapts an async closure into a [`TaskCallback`].
pub struct FnCallback<F> {
    func: F,
}

pub fn callback_fn<F, Fut>(func: F) -> FnCallback<F>
where
    F: Fn(TaskPayload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PipelineError>> + Send,
{
    FnCallback { func }
}

#[async_trait]
impl<F, Fut> TaskCallback for FnCallback<F>
where
    F: Fn(TaskPayload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PipelineError>> + Send,
{
    async fn run(&self, payload: &TaskPayload) -> Result<(), PipelineError> {
        (self.func)(payload.clone()).await
    }
}

#[derive(Default, Clone)]
pub(crate) struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn TaskCallback>>,
}

impl CallbackRegistry {
    pub(crate) fn register(&mut self, task_type: &str, callback: Arc<dyn TaskCallback>) -> bool {
        self.callbacks
            .insert(task_type.to_string(), callback)
            .is_some()
    }

    pub(crate) fn get(&self, task_type: &str) -> Option<Arc<dyn TaskCallback>> {
        self.callbacks.get(task_type).cloned()
    }
}

/// Runs the callback for one attempt. Missing callbacks, callback errors and
/// panics all come back as an error message for the task record.
pub(crate) async fn invoke_callback(
    callback: Option<Arc<dyn TaskCallback>>,
    task_type: &str,
    payload: &TaskPayload,
) -> Result<(), String> {
    let callback = callback
        .ok_or_else(|| SchedulerError::UnregisteredCallback(task_type.to_string()).to_string())?;

    match AssertUnwindSafe(callback.run(payload)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(panic) => Err(PipelineError::Panicked(panic_message(panic)).to_string()),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Completed,
    RetryScheduled { at: DateTime<Utc> },
    Failed,
}

/// Applies the retry policy to a task that just finished an attempt.
pub(crate) fn apply_attempt_outcome(
    task: &mut ScheduledTask,
    result: Result<(), String>,
    now: DateTime<Utc>,
    retry_delay: Duration,
) -> Result<AttemptOutcome, SchedulerError> {
    match result {
        Ok(()) => {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
            info!("task completed successfully: {}", task.id);
            Ok(AttemptOutcome::Completed)
        }
        Err(message) => {
            task.retry_count += 1;
            task.error_message = Some(message.clone());
            if task.retry_count < task.max_retries {
                let delay = chrono::Duration::from_std(retry_delay)
                    .map_err(|_| SchedulerError::DurationOutOfRange)?;
                let at = now + delay;
                task.status = TaskStatus::Pending;
                task.scheduled_time = at;
                warn!(
                    "task {} failed, scheduling retry {}/{} at {}: {}",
                    task.id, task.retry_count, task.max_retries, at, message
                );
                Ok(AttemptOutcome::RetryScheduled { at })
            } else {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now);
                error!(
                    "task {} failed permanently after {} attempts: {}",
                    task.id, task.retry_count, message
                );
                Ok(AttemptOutcome::Failed)
            }
        }
    }
}
