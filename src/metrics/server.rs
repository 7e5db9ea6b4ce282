use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use crate::health::{HealthBoard, HealthStatus};

/// Start the metrics HTTP server
/// This should be called in a separate thread/runtime to avoid conflicts
pub async fn start_metrics_server(
    registry: Arc<Registry>,
    health: Arc<HealthBoard>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(board: web::Data<Arc<HealthBoard>>) -> impl Responder {
    let snapshot = board.system_health();

    let (status, detail) = match &snapshot.overall_status {
        HealthStatus::Healthy => ("healthy", None),
        HealthStatus::Degraded(msg) => ("degraded", Some(msg.clone())),
        HealthStatus::Unhealthy(msg) => ("unhealthy", Some(msg.clone())),
    };

    let body = serde_json::json!({
        "status": status,
        "detail": detail,
        "components": snapshot.components.len(),
        "service": "stage-sync-bridge"
    });

    if snapshot.overall_status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}
