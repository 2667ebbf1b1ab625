use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Task type served by the content pipeline.
pub const POST_CREATION_TASK: &str = "post_creation";

pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Opaque key/value mapping handed verbatim to the task callback.
pub type TaskPayload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(SchedulerError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub task_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ScheduledTask {
    pub(crate) fn new(
        id: String,
        task_type: String,
        scheduled_time: DateTime<Utc>,
        payload: TaskPayload,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type,
            scheduled_time,
            payload,
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// Due means pending with a scheduled time that has passed. Whether an
    /// execution is already in flight is checked against the running map.
    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_time <= now
    }
}

/// Read projection returned by status and list queries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: ScheduledTask,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListing {
    pub total_tasks: usize,
    pub filter: Option<TaskStatus>,
    pub tasks: Vec<TaskSnapshot>,
    pub scheduler_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerRunState {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SchedulerConfig {
    /// `RETRY_DELAY` is expressed in minutes.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_secs("SCHEDULER_POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
            error_backoff: env_secs("SCHEDULER_ERROR_BACKOFF_SECS").unwrap_or(defaults.error_backoff),
            retry_delay: env_u64("RETRY_DELAY")
                .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
                .unwrap_or(defaults.retry_delay),
            max_retries: env_u64("MAX_RETRIES")
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_retries),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key)
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task with ID {0} already exists")]
    DuplicateTask(String),
    #[error("scheduled time must be in the future (got {scheduled_time}, now {now})")]
    InvalidSchedule {
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("task {0} not found")]
    NotFound(String),
    #[error("no callback registered for task type: {0}")]
    UnregisteredCallback(String),
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    #[error("duration out of range")]
    DurationOutOfRange,
    #[error("scheduler state lock poisoned")]
    StatePoisoned,
}

/// Failure reported by (or raised from) a task callback. Every variant is
/// retried up to the task's `max_retries`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Rejected(String),
    #[error("external call failed: {0}")]
    External(String),
    #[error("callback panicked: {0}")]
    Panicked(String),
}
