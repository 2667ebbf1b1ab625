pub mod linkedin_auth;
pub mod pipeline;
pub mod service;

mod scheduler;

pub use scheduler::{
    callback_fn, FnCallback, PipelineError, ScheduledTask, Scheduler, SchedulerConfig,
    SchedulerError, SchedulerRunState, TaskCallback, TaskListing, TaskPayload, TaskSnapshot,
    TaskStatus, POST_CREATION_TASK,
};
