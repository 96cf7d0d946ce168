//! HTTP API
//!
//! JSON routes under `/modbus/*` consumed by the dashboard, served with axum.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;

pub use error::ApiError;
pub use routes::create_router;
