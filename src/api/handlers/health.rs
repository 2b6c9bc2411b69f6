//! Service banner and liveness endpoints.

use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /`
pub async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "School Management System API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// `GET /health`, unauthenticated, for probes.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".to_string() })
}
