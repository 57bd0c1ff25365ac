//! Sporky HTTP 服务
//!
//! 启动: cargo run --bin sporky-web --features web
//! POST /query 处理一条请求，GET /health 健康检查。

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use sporky::config::load_config;
use sporky::{AgentRuntime, QueryRequest, QueryResponse};

#[derive(Clone)]
struct AppState {
    runtime: Arc<AgentRuntime>,
}

async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    tracing::info!(session_id = %req.session_id, "query received");
    state
        .runtime
        .handle_query(req)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sporky::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let runtime = AgentRuntime::from_config(&cfg).context("Failed to create agent runtime")?;

    let app = router(AppState {
        runtime: Arc::new(runtime),
    });

    let bind = std::env::var("SPORKY_BIND").unwrap_or_else(|_| cfg.server.bind.clone());
    tracing::info!("Sporky API: http://{}", bind);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
