//! Health check endpoints.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    pub model: String,
}

#[derive(Serialize)]
pub struct HealthMetrics {
    pub active_sessions: usize,
    pub pending_requests: usize,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub api: &'static str,
}

/// Service banner
pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        api: "/api/v1",
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let db_healthy = state.engine.database().ping().is_ok();

    let pending_requests = state
        .active_requests
        .load(std::sync::atomic::Ordering::SeqCst);

    let status = if db_healthy { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            model: state.engine.model().name,
        },
        metrics: HealthMetrics {
            active_sessions: state.engine.sessions().count().await,
            pending_requests,
        },
    })
}
