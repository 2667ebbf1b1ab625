mod auth;
mod config;
mod handlers;
mod server;
mod state;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::ServiceConfig;
pub use server::{build_router, run_server};
pub use state::AppState;
