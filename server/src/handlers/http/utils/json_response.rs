use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use serde_json::json;
use shared::types::ErrorResponse;
use tracing::{debug, warn};

use crate::handlers::http::HttpBody;

pub fn full<T: Into<Bytes>>(chunk: T) -> HttpBody {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
pub fn deliver_serialized_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<HttpBody>> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Delivers a JSON error response with the specified error code, message, and status.
pub fn deliver_error_json(
    error_code: &str,
    message: &str,
    status: StatusCode,
) -> Result<Response<HttpBody>> {
    if status.is_server_error() {
        warn!(
            "Delivering error JSON: {} - {} ({})",
            status.as_u16(),
            error_code,
            message
        );
    } else {
        debug!("Delivering error JSON: {} - {}", status.as_u16(), error_code);
    }

    deliver_serialized_json(&ErrorResponse::new(error_code, message), status)
}

/// Delivers a success JSON response with optional data.
pub fn deliver_success_json<T: Serialize>(data: Option<T>) -> Result<Response<HttpBody>> {
    let body = match data {
        Some(d) => json!({ "status": "success", "data": d }),
        None => json!({ "status": "success" }),
    };

    deliver_serialized_json(&body, StatusCode::OK)
}

/// Last-resort response when building a proper one failed.
pub fn internal_error() -> Response<HttpBody> {
    let mut res = Response::new(full(
        r#"{"status":"error","code":"INTERNAL_ERROR","message":"An internal error occurred"}"#,
    ));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    res
}
