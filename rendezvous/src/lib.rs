pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod peer;
pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{delete, get, post, put};
use axum::Router;

use handlers::AppState;
use registry::Registry;

pub const SOFTWARE: &str = concat!("rendezvous/", env!("CARGO_PKG_VERSION"));

pub fn build_router(queue_capacity: usize, heartbeat_interval: Duration) -> (Router, Arc<Registry>) {
    let registry = Arc::new(Registry::new(queue_capacity));
    let state = AppState {
        registry: registry.clone(),
        heartbeat_interval,
        started_at: Instant::now(),
        software: SOFTWARE,
    };

    let router = Router::new()
        .route("/", post(handlers::create_or_join))
        .route("/_info", get(handlers::info))
        .route("/:id", get(handlers::receive))
        .route("/:id", put(handlers::forward))
        .route("/:id", delete(handlers::delete))
        .with_state(state);

    (router, registry)
}

/// Background task reaping channels idle longer than `idle_timeout`,
/// woken every `sweep_interval`.
pub async fn reap_task(registry: Arc<Registry>, sweep_interval: Duration, idle_timeout: Duration) {
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        registry.reap_idle(idle_timeout);
    }
}
