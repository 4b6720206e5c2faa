use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod locator;
mod quiz;
mod render;
mod routes;
mod session;
mod storage;
mod timestamp;
mod workflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "kb_video_search=info,axum=info".into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = config::Settings::from_env()?;
    let store = storage::S3Store::from_config(&settings.storage, settings.http_timeout).await;
    let workflow = workflow::WorkflowClient::new(settings.workflow.clone(), settings.http_timeout)?;

    let state = routes::AppState {
        store: Arc::new(store),
        workflow,
        sessions: Arc::new(session::SessionStore::new(settings.session_idle, settings.max_sessions)),
        presign_ttl: settings.presign_ttl,
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state, settings.static_dir.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        );

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", settings.port);

    axum::serve(listener, app).await?;
    Ok(())
}
