use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use stamps_domain::model::NodeHealth;

use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub nodes: Vec<NodeHealth>,
}

/// Probes every configured node. Answers 503 when none of them is healthy.
pub async fn health_handler(state: web::Data<AppState>) -> HttpResponse {
    let nodes = state.client().node_health().await;
    let healthy = nodes.iter().any(|node| node.healthy);
    let body = HealthResponse { healthy, nodes };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

pub async fn metrics_handler(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(PROMETHEUS_CONTENT_TYPE)
        .body(state.telemetry().render_metrics())
}
