use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::{apply_attempt_outcome, invoke_callback, CallbackRegistry, TaskCallback};
use super::store::TaskStore;
use super::types::{
    ScheduledTask, SchedulerConfig, SchedulerError, SchedulerRunState, TaskListing, TaskPayload,
    TaskSnapshot, TaskStatus,
};

/// Owns the task store and the running-execution map. Cheap to clone; every
/// clone drives the same scheduler.
///
/// The state mutex is never held across an `.await`. Checking whether a task
/// is due and inserting its running entry happen under one lock acquisition,
/// which is what keeps executions single-flight per task id.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    callbacks: RwLock<CallbackRegistry>,
    running: AtomicBool,
    next_execution_id: AtomicU64,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct SchedulerState {
    store: TaskStore,
    running_tasks: HashMap<String, RunningTask>,
}

/// Live execution of one task attempt.
struct RunningTask {
    execution_id: u64,
    handle: JoinHandle<()>,
}

impl SchedulerState {
    fn owns_execution(&self, task_id: &str, execution_id: u64) -> bool {
        self.running_tasks
            .get(task_id)
            .map_or(false, |running| running.execution_id == execution_id)
    }

    fn snapshot(&self, task: &ScheduledTask) -> TaskSnapshot {
        TaskSnapshot {
            task: task.clone(),
            is_running: self.running_tasks.contains_key(&task.id),
        }
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        info!(
            "content scheduler initialized (poll={:?}, retry_delay={:?}, max_retries={})",
            config.poll_interval, config.retry_delay, config.max_retries
        );
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                state: Mutex::new(SchedulerState::default()),
                callbacks: RwLock::new(CallbackRegistry::default()),
                running: AtomicBool::new(false),
                next_execution_id: AtomicU64::new(1),
                loop_handle: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Registers the callback for `task_type`, replacing any previous one.
    pub fn register_callback<C>(&self, task_type: &str, callback: C)
    where
        C: TaskCallback + 'static,
    {
        self.register_shared_callback(task_type, Arc::new(callback));
    }

    pub fn register_shared_callback(&self, task_type: &str, callback: Arc<dyn TaskCallback>) {
        let mut callbacks = self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        if callbacks.register(task_type, callback) {
            warn!("replaced callback for task type: {}", task_type);
        } else {
            info!("registered callback for task type: {}", task_type);
        }
    }

    pub fn schedule_task(
        &self,
        task_id: impl Into<String>,
        task_type: &str,
        scheduled_time: DateTime<Utc>,
        payload: TaskPayload,
    ) -> Result<ScheduledTask, SchedulerError> {
        let task_id = task_id.into();
        let mut state = self.inner.lock_state()?;
        if state.store.get(&task_id).is_some() {
            return Err(SchedulerError::DuplicateTask(task_id));
        }
        let now = Utc::now();
        if scheduled_time <= now {
            return Err(SchedulerError::InvalidSchedule {
                scheduled_time,
                now,
            });
        }

        let task = ScheduledTask::new(
            task_id,
            task_type.to_string(),
            scheduled_time,
            payload,
            self.inner.config.max_retries,
            now,
        );
        state.store.insert(task.clone())?;
        info!(
            "task scheduled: {} ({}) at {}",
            task.id, task.task_type, task.scheduled_time
        );
        Ok(task)
    }

    /// Cancels a pending or running task. A running execution is aborted at
    /// its next suspension point; side effects it already caused stay.
    /// Tasks already in a terminal state are returned unchanged.
    pub fn cancel_task(&self, task_id: &str) -> Result<ScheduledTask, SchedulerError> {
        let mut guard = self.inner.lock_state()?;
        let state = &mut *guard;
        let task = state
            .store
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))?;

        if task.status.is_terminal() {
            debug!("task {} already {}; nothing to cancel", task_id, task.status);
            return Ok(task.clone());
        }

        if let Some(running) = state.running_tasks.remove(task_id) {
            running.handle.abort();
            info!("cancelled running execution of task: {}", task_id);
        }
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        info!("task cancelled: {}", task_id);
        Ok(task.clone())
    }

    pub fn get_task_status(&self, task_id: &str) -> Result<TaskSnapshot, SchedulerError> {
        let state = self.inner.lock_state()?;
        state
            .store
            .get(task_id)
            .map(|task| state.snapshot(task))
            .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))
    }

    pub fn list_tasks(&self, filter: Option<TaskStatus>) -> Result<TaskListing, SchedulerError> {
        let state = self.inner.lock_state()?;
        let tasks: Vec<TaskSnapshot> = state
            .store
            .list(filter)
            .into_iter()
            .map(|task| state.snapshot(task))
            .collect();
        Ok(TaskListing {
            total_tasks: tasks.len(),
            filter,
            tasks,
            scheduler_running: self.is_running(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Runs one scan: dispatches every due task and returns how many were
    /// started. The background loop calls this on each cycle.
    pub fn tick(&self) -> Result<usize, SchedulerError> {
        self.inner.dispatch_due_tasks()
    }

    /// Spawns the background loop on the current tokio runtime.
    pub fn start(&self) -> SchedulerRunState {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return SchedulerRunState::AlreadyRunning;
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(run_loop(inner));
        *self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(|poison| poison.into_inner()) = Some(handle);
        info!("content scheduler started");
        SchedulerRunState::Started
    }

    /// Stops the loop and aborts every in-flight execution. Aborted tasks go
    /// back to pending without consuming a retry.
    pub async fn stop(&self) -> SchedulerRunState {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return SchedulerRunState::AlreadyStopped;
        }

        let loop_handle = self
            .inner
            .loop_handle
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();
        if let Some(handle) = loop_handle {
            handle.abort();
            let _ = handle.await;
        }

        let mut guard = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let state = &mut *guard;
        for (task_id, running) in state.running_tasks.drain() {
            running.handle.abort();
            if let Some(task) = state.store.get_mut(&task_id) {
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Pending;
                }
            }
            info!("cancelled running task: {}", task_id);
        }

        info!("content scheduler stopped");
        SchedulerRunState::Stopped
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> Result<MutexGuard<'_, SchedulerState>, SchedulerError> {
        self.state.lock().map_err(|_| SchedulerError::StatePoisoned)
    }

    fn dispatch_due_tasks(self: &Arc<Self>) -> Result<usize, SchedulerError> {
        let mut state = self.lock_state()?;
        let now = Utc::now();
        let due = {
            let running = &state.running_tasks;
            state
                .store
                .due_task_ids(now, |task_id| running.contains_key(task_id))
        };

        for task_id in &due {
            let execution_id = self.next_execution_id.fetch_add(1, Ordering::SeqCst);
            let handle = tokio::spawn(execute_task(self.clone(), task_id.clone(), execution_id));
            state.running_tasks.insert(
                task_id.clone(),
                RunningTask {
                    execution_id,
                    handle,
                },
            );
            info!("started execution of task: {}", task_id);
        }
        Ok(due.len())
    }

    fn callback_for(&self, task_type: &str) -> Option<Arc<dyn TaskCallback>> {
        self.callbacks
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(task_type)
    }
}

async fn run_loop(inner: Arc<SchedulerInner>) {
    info!("scheduler loop started");
    while inner.running.load(Ordering::SeqCst) {
        let pause = match inner.dispatch_due_tasks() {
            Ok(_) => inner.config.poll_interval,
            Err(err) => {
                error!("error in scheduler loop: {}", err);
                inner.config.error_backoff
            }
        };
        tokio::time::sleep(pause).await;
    }
    info!("scheduler loop exited");
}

/// One attempt of one task. Only the execution that still owns the running
/// entry may write the outcome back; cancelled or stopped executions discard
/// their result.
async fn execute_task(inner: Arc<SchedulerInner>, task_id: String, execution_id: u64) {
    let (task_type, payload) = {
        let mut guard = match inner.lock_state() {
            Ok(guard) => guard,
            Err(err) => {
                error!("cannot start task {}: {}", task_id, err);
                return;
            }
        };
        let state = &mut *guard;
        if !state.owns_execution(&task_id, execution_id) {
            return;
        }
        match state.store.get_mut(&task_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Running;
                if task.started_at.is_none() {
                    task.started_at = Some(Utc::now());
                }
                (task.task_type.clone(), task.payload.clone())
            }
            _ => {
                state.running_tasks.remove(&task_id);
                return;
            }
        }
    };

    let callback = inner.callback_for(&task_type);
    let result = invoke_callback(callback, &task_type, &payload).await;

    let mut guard = match inner.lock_state() {
        Ok(guard) => guard,
        Err(err) => {
            error!("cannot record outcome of task {}: {}", task_id, err);
            return;
        }
    };
    let state = &mut *guard;
    if !state.owns_execution(&task_id, execution_id) {
        debug!("discarding late result for task {}", task_id);
        return;
    }
    state.running_tasks.remove(&task_id);

    let Some(task) = state.store.get_mut(&task_id) else {
        return;
    };
    if task.status != TaskStatus::Running {
        debug!("task {} is {}; discarding result", task_id, task.status);
        return;
    }
    if let Err(err) = apply_attempt_outcome(task, result, Utc::now(), inner.config.retry_delay) {
        error!("cannot apply retry policy to task {}: {}", task_id, err);
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        task.error_message = Some(err.to_string());
    }
}
