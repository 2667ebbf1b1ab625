pub mod client;
pub mod config;
pub mod errors;

pub use client::{Identity, LinkedInClient, PostResult};
pub use config::LinkedInApiConfig;
pub use errors::{categorize_status, ErrorCategory, PublishError};
