use std::net::{IpAddr, SocketAddr};

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tracing::info;

use super::auth::require_bearer;
use super::config::ServiceConfig;
use super::handlers::{
    cancel_task, health, linkedin_authorize, linkedin_exchange_token, list_tasks, schedule_post,
    start_scheduler, stop_scheduler, task_status,
};
use super::state::AppState;
use super::BoxError;

/// Every route except the health check sits behind the bearer token guard.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/schedule-post", post(schedule_post))
        .route("/api/v1/tasks", get(list_tasks))
        .route("/api/v1/status/:task_id", get(task_status))
        .route("/api/v1/tasks/:task_id", delete(cancel_task))
        .route("/api/v1/scheduler/start", post(start_scheduler))
        .route("/api/v1/scheduler/stop", post(stop_scheduler))
        .route("/api/v1/linkedin/authorize", get(linkedin_authorize))
        .route("/api/v1/linkedin/exchange-token", post(linkedin_exchange_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/api/v1/health-check", get(health))
        .merge(protected)
        .with_state(state)
}

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let state = AppState::from_config(&config)?;

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);

    state.scheduler.start();
    let scheduler = state.scheduler.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("content service listening on {}", addr);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    scheduler.stop().await;
    info!("content service stopped");
    serve_result?;
    Ok(())
}
