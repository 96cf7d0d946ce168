//! API routes configuration

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::*;
use crate::core::bus::ModbusBus;

/// Create API routes
pub fn create_router(bus: ModbusBus) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/modbus/connect", post(connect))
        .route("/modbus/disconnect", post(disconnect))
        .route("/modbus/status", get(status))
        .route("/modbus/read", post(read))
        .route("/modbus/data", post(read))
        .route("/modbus/write", post(write))
        .route("/modbus/logs", get(logs))
        .route("/modbus/logs/clear", post(clear_logs))
        .route("/modbus/scan", get(scan))
        .route("/modbus/functions/{code}", get(function_name))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(bus)
}
