pub mod auth;
pub mod routes;
pub mod user;
pub mod utils;

use std::convert::Infallible;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::{BoxBody, UnsyncBoxBody};
use hyper::{Request, Response, StatusCode};
use tracing::error;

use crate::AppState;
use crate::auth::AuthError;
use routes::Router;
use utils::json_response;

pub type HttpBody = BoxBody<Bytes, Infallible>;
pub type RequestBody = UnsyncBoxBody<Bytes, hyper::Error>;
pub type HttpRequest = Request<RequestBody>;
pub type HttpResponse = Response<HttpBody>;

/// Route `req` and turn any handler error into a 500.
pub async fn handle(router: &Router, req: HttpRequest, state: AppState) -> HttpResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match router.route(req, state).await {
        Ok(res) => res,
        Err(e) => {
            error!("{} {} failed: {:#}", method, path, e);
            json_response::internal_error()
        }
    }
}

/// Generic client-facing response for a session-manager failure.
///
/// Gate failures all become the same 401; nothing here reveals which
/// internal check failed.
pub fn deliver_auth_error(e: &AuthError) -> Result<HttpResponse> {
    if e.is_rejection() {
        return routes::unauthorized();
    }

    let message = match e.public_code() {
        "INVALID_CREDENTIALS" => "Invalid username or password",
        "SESSION_UNAVAILABLE" => "Session service temporarily unavailable, please retry",
        "FORBIDDEN" => "Authority not assigned to this user",
        "NOT_FOUND" => "User not found",
        _ => "An internal error occurred",
    };

    let status = e.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    }

    json_response::deliver_error_json(e.public_code(), message, status)
        .context("Failed to deliver auth error")
}
