mod core;
mod executor;
mod store;
mod types;

pub use core::Scheduler;
pub use executor::{callback_fn, FnCallback, TaskCallback};
pub use types::{
    PipelineError, ScheduledTask, SchedulerConfig, SchedulerError, SchedulerRunState, TaskListing,
    TaskPayload, TaskSnapshot, TaskStatus, POST_CREATION_TASK,
};
