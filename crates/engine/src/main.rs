//! StoryForge Engine - backend server for the story writing factory.
//!
//! The engine:
//! - drives the Architect/Writer/Critic chapter pipeline
//! - serves the polling JSON API over axum
//! - runs the scheduler and retention workers in the background

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storyforge_engine::infrastructure::config::AppConfig;
use storyforge_engine::infrastructure::http;
use storyforge_engine::infrastructure::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyforge_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting StoryForge Engine");

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  LLM: {}", config.llm_base_url);
    tracing::info!(
        "  Budget: ${}/day, ${}/hour",
        config.budget.daily_usd,
        config.budget.session_usd
    );

    let state = Arc::new(AppState::new(config).await?);
    tracing::info!("Application state initialized");

    // Crash recovery: jobs left running by a previous process fail now.
    state.runner.recover_orphaned_jobs().await?;

    // Scheduler worker: processes due schedules once a minute.
    let scheduler_worker = {
        let scheduler = state.scheduler.clone();
        tokio::spawn(async move {
            tracing::info!("Starting scheduler worker");
            loop {
                if let Err(e) = scheduler.tick().await {
                    tracing::error!(error = %e, "Scheduler tick failed");
                }
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        })
    };

    // Retention worker: prunes terminal jobs and expired embeddings.
    let cleanup_worker = {
        let jobs = state.jobs.clone();
        let embeddings = state.embeddings.clone();
        let retention_hours = state.config.job_retention_hours;
        tokio::spawn(async move {
            tracing::info!("Starting retention cleanup worker");
            loop {
                match jobs.cleanup(retention_hours).await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "Pruned old job records");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Job cleanup failed"),
                }
                if let Err(e) = embeddings.cleanup_expired().await {
                    tracing::warn!(error = %e, "Embedding cache cleanup failed");
                }
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        })
    };

    tracing::info!("Background workers started");

    let server_port = state.config.server_port;
    let app = Router::new()
        .route("/health", get(health_check))
        .merge(http::create_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping workers...");
            scheduler_worker.abort();
            cleanup_worker.abort();
            tracing::info!("Workers stopped");
        }
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
