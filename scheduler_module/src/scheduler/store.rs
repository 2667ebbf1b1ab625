use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::types::{ScheduledTask, SchedulerError, TaskStatus};

/// In-memory task registry. Records are never removed; terminal tasks stay
/// queryable for the lifetime of the process.
#[derive(Debug, Default)]
pub(crate) struct TaskStore {
    tasks: HashMap<String, ScheduledTask>,
}

impl TaskStore {
    pub(crate) fn insert(&mut self, task: ScheduledTask) -> Result<(), SchedulerError> {
        if self.tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub(crate) fn get(&self, task_id: &str) -> Option<&ScheduledTask> {
        self.tasks.get(task_id)
    }

    pub(crate) fn get_mut(&mut self, task_id: &str) -> Option<&mut ScheduledTask> {
        self.tasks.get_mut(task_id)
    }

    pub(crate) fn due_task_ids<F>(&self, now: DateTime<Utc>, mut is_running: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        self.tasks
            .values()
            .filter(|task| task.is_due(now) && !is_running(&task.id))
            .map(|task| task.id.clone())
            .collect()
    }

    /// Tasks ordered by scheduled time ascending, ties broken by id.
    pub(crate) fn list(&self, filter: Option<TaskStatus>) -> Vec<&ScheduledTask> {
        let mut tasks: Vec<&ScheduledTask> = self
            .tasks
            .values()
            .filter(|task| filter.map_or(true, |status| task.status == status))
            .collect();
        tasks.sort_by(|a, b| {
            a.scheduled_time
                .cmp(&b.scheduled_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
