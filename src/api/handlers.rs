//! API handlers for the simulated bus

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    response::Json,
};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::core::bus::ModbusBus;
use crate::core::packet::Packet;
use crate::core::protocol::{describe_function_code, is_supported};
use crate::core::serial::mock_port_names;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Like [`body`], but an empty body means "all defaults"
fn body_or_default<T>(bytes: &Bytes) -> Result<T, ApiError>
where
    T: Default + serde::de::DeserializeOwned,
{
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    body(Json::from_bytes(bytes))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// Open the simulated port
pub async fn connect(
    State(bus): State<ModbusBus>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<ConnectionResponse> {
    let request = body(payload)?;
    let port = match request.port.as_deref() {
        Some(port) if !port.is_empty() => port.to_string(),
        _ => return Err(ApiError::BadRequest("port is required".to_string())),
    };
    let params = request.serial_params().map_err(ApiError::BadRequest)?;

    bus.connect(&port, params).await?;
    Ok(Json(ConnectionResponse {
        success: true,
        message: format!("Connected to {port}"),
        is_open: true,
    }))
}

/// Close the simulated port
pub async fn disconnect(State(bus): State<ModbusBus>) -> Json<ConnectionResponse> {
    bus.disconnect().await;
    Json(ConnectionResponse {
        success: true,
        message: "Disconnected".to_string(),
        is_open: false,
    })
}

/// Connection status
pub async fn status(State(bus): State<ModbusBus>) -> Json<StatusResponse> {
    let snapshot = bus.status();
    Json(StatusResponse {
        is_open: snapshot.is_open(),
        port: snapshot.port,
        status: snapshot.status,
    })
}

/// Read coils, inputs or registers
pub async fn read(
    State(bus): State<ModbusBus>,
    payload: Bytes,
) -> ApiResult<ReadResponse> {
    let request: ReadRequest = body_or_default(&payload)?;
    let outcome = bus
        .read(request.slave_id, request.function_code, request.address, request.length)
        .await?;

    Ok(Json(ReadResponse {
        success: true,
        data: outcome.values,
        address: request.address,
        function_code: request.function_code,
        error: outcome.error,
    }))
}

/// Write Single Register
pub async fn write(
    State(bus): State<ModbusBus>,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> ApiResult<WriteResponse> {
    let request = body(payload)?;
    let outcome = bus.write(request.slave_id, request.address, request.value).await?;

    Ok(Json(WriteResponse {
        success: true,
        address: request.address,
        value: request.value,
        error: outcome.error,
    }))
}

/// Packet log, newest first
pub async fn logs(
    State(bus): State<ModbusBus>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<Packet>> {
    match query.limit {
        Some(limit) => Json(bus.logs_limited(limit)),
        None => Json(bus.logs()),
    }
}

/// Empty the packet log
pub async fn clear_logs(State(bus): State<ModbusBus>) -> Json<MessageResponse> {
    bus.clear_logs();
    Json(MessageResponse {
        success: true,
        message: "Logs cleared".to_string(),
    })
}

/// Mock serial port enumeration
pub async fn scan() -> Json<ScanResponse> {
    let platform = std::env::consts::OS;
    let ports = mock_port_names(platform);
    info!(platform, count = ports.len(), "port scan");
    Json(ScanResponse {
        success: true,
        ports,
        platform: platform.to_string(),
    })
}

/// Function code name lookup
pub async fn function_name(code: Result<Path<u8>, PathRejection>) -> ApiResult<FunctionResponse> {
    let Path(code) = code.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    Ok(Json(FunctionResponse {
        code,
        name: describe_function_code(code),
        supported: is_supported(code),
    }))
}
