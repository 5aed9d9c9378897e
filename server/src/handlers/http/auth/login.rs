use std::collections::HashMap;

use anyhow::Result;
use hyper::{StatusCode, header};
use shared::types::{LoginData, LoginError, LoginResponse};
use tracing::{info, warn};

use crate::AppState;
use crate::auth::AuthError;
use crate::handlers::http::utils::{self, json_response};
use crate::handlers::http::{HttpRequest, HttpResponse};

/// Main login handler
///
/// Accepts a JSON body (`username` / `password`, or the camel-case
/// `userName` / `passWord`) or an urlencoded form.
pub async fn handle_login(req: HttpRequest, state: AppState) -> Result<HttpResponse> {
    info!("Processing login request");

    let login_data = match parse_login(req).await {
        Ok(data) => data,
        Err(login_error) => {
            warn!("Login parsing failed: {}", login_error.to_code());
            return deliver_login_response(&login_error.to_response(), StatusCode::BAD_REQUEST);
        }
    };

    match state
        .sessions
        .login(&login_data.username, &login_data.password)
        .await
    {
        Ok(outcome) => {
            let response = LoginResponse::Success {
                user: outcome.identity,
                token: outcome.token,
                expires_at: outcome.expires_at,
                message: "Login successful".to_string(),
            };
            deliver_login_response(&response, StatusCode::OK)
        }
        Err(e) => {
            let status = e.status();
            deliver_login_response(&login_error_for(&e).to_response(), status)
        }
    }
}

/// Collapse a session-manager error into what the caller may learn.
fn login_error_for(e: &AuthError) -> LoginError {
    match e {
        AuthError::InvalidCredentials => LoginError::InvalidCredentials,
        e if e.status() == StatusCode::SERVICE_UNAVAILABLE => LoginError::SessionUnavailable,
        _ => LoginError::InternalError,
    }
}

fn deliver_login_response(response: &LoginResponse, status: StatusCode) -> Result<HttpResponse> {
    let res = json_response::deliver_serialized_json(response, status)?;
    Ok(utils::add_no_cache_headers(res))
}

/// Parse login data from a JSON or form body.
async fn parse_login(req: HttpRequest) -> std::result::Result<LoginData, LoginError> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let body = utils::read_body(req.into_body())
        .await
        .ok_or(LoginError::MalformedBody)?;

    let fields: HashMap<String, String> = if is_form {
        form_urlencoded::parse(body.as_ref()).into_owned().collect()
    } else {
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|_| LoginError::MalformedBody)?;
        let object = value.as_object().ok_or(LoginError::MalformedBody)?;
        object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    };

    let username = field(&fields, &["username", "userName"])
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| LoginError::MissingField("username".to_string()))?;

    let password = field(&fields, &["password", "passWord"])
        .filter(|p| !p.is_empty())
        .ok_or_else(|| LoginError::MissingField("password".to_string()))?;

    Ok(LoginData { username, password })
}

fn field(fields: &HashMap<String, String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| fields.get(*n).cloned())
}
