mod args;
mod db;
mod domain;
mod engine;
mod error;
mod handlers;
mod logging;
mod recurrence;
mod scheduler;
mod store;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use args::parse_args;
use axum::{
    Router,
    routing::{get, post},
};
use db::{PgExpenseStore, PgTemplateStore, create_pool, run_migrations};
use engine::RecurringExpenseService;
use handlers::{
    create_recurring, delete_recurring, generate_recurring, get_recurring, list_recurring,
    pause_recurring, recurring_history, resume_recurring, upcoming_recurring, update_recurring,
};
use logging::setup_logging;
use scheduler::Scheduler;
use store::SystemClock;

pub type Service = RecurringExpenseService<PgTemplateStore, PgExpenseStore, SystemClock>;

pub struct AppState {
    service: Arc<Service>,
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    setup_logging(&args.base_log_dir);

    let pool = create_pool(&args.database_url)
        .await
        .expect("Failed to create PostgreSQL pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let service = Arc::new(RecurringExpenseService::new(
        PgTemplateStore::new(pool.clone()),
        PgExpenseStore::new(pool),
        SystemClock,
    ));

    let scheduler = Arc::new(Scheduler::new(service.clone()));
    scheduler.start();

    let app_state = Arc::new(AppState { service });

    let app = Router::new()
        .route(
            "/api/users/{user_id}/recurring",
            post(create_recurring).get(list_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/upcoming",
            get(upcoming_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/{id}",
            get(get_recurring)
                .put(update_recurring)
                .delete(delete_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/{id}/pause",
            post(pause_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/{id}/resume",
            post(resume_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/{id}/generate",
            post(generate_recurring),
        )
        .route(
            "/api/users/{user_id}/recurring/{id}/history",
            get(recurring_history),
        )
        .route("/", get(|| async { "Personal finance tracker API" }))
        .with_state(app_state);

    let bind_address = format! {"0.0.0.0:{}", args.port};
    tracing::info!("Server listening on {}...", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Torn down after the server drains; waits for an in-flight sweep.
    scheduler.shutdown().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
