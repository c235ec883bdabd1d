//! Kestrel node agent.
//!
//! Registers this node with the store, then keeps local containers in line
//! with the pods assigned to it until interrupted.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use kestrel_kubelet::{register_node, AgentConfig, NodeAgent, NoopRuntime};
use kestrel_store::{HttpStoreClient, StoreClient, SubnetAllocator};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    agent: Arc<NodeAgent>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    node: String,
    pods: usize,
    last_error: Option<String>,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "kestrel-kubelet",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ReadyResponse {
            node: state.agent.node_name().to_string(),
            pods: state.agent.pods().len(),
            last_error: state.agent.last_error(),
        }),
    )
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kestrel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::parse();
    tracing::info!(store_url = %config.store_url, "Starting Kestrel node agent");

    let store: Arc<dyn StoreClient> = Arc::new(HttpStoreClient::new(&config.store_url)?);
    let node = register_node(store.as_ref(), &config, &SubnetAllocator::new()).await?;

    let agent = Arc::new(NodeAgent::new(
        &node,
        &config,
        store,
        Arc::new(NoopRuntime),
    ));
    let cancel = CancellationToken::new();

    let app = create_router(AppState {
        agent: Arc::clone(&agent),
    });
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal_cancel.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    agent.run(cancel).await;
    Ok(())
}
