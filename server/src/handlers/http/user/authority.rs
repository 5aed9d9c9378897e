use anyhow::{Context, Result};
use hyper::StatusCode;
use hyper::header::{HeaderName, HeaderValue};
use serde_json::json;
use shared::types::SetUserAuthority;
use tracing::warn;

use crate::AppState;
use crate::auth::AuthContext;
use crate::handlers::http::utils::{self, NEW_EXPIRES_AT_HEADER, NEW_TOKEN_HEADER, json_response};
use crate::handlers::http::{HttpRequest, HttpResponse, deliver_auth_error};

/// `POST /user/setUserAuthority`
///
/// Switches the caller to another of their assigned authorities and returns
/// a replacement token in the `new-token` header.  The presented token is
/// superseded exactly as by a new login.
pub async fn handle_set_user_authority(
    req: HttpRequest,
    state: AppState,
    ctx: AuthContext,
) -> Result<HttpResponse> {
    let Some(body) = utils::read_body(req.into_body()).await else {
        return json_response::deliver_error_json(
            "MALFORMED_BODY",
            "Request body could not be parsed",
            StatusCode::BAD_REQUEST,
        );
    };

    let request: SetUserAuthority = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!("Invalid setUserAuthority body from {}: {}", ctx.claims.username, e);
            return json_response::deliver_error_json(
                "MALFORMED_BODY",
                "Request body could not be parsed",
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let authority_id = request.authority_id.trim();
    if authority_id.is_empty() {
        return json_response::deliver_error_json(
            "MISSING_FIELD",
            "Missing required field: authorityId",
            StatusCode::BAD_REQUEST,
        );
    }

    let issued = match state
        .sessions
        .reissue_with_authority(&ctx.claims, authority_id)
        .await
    {
        Ok(issued) => issued,
        Err(e) => return deliver_auth_error(&e),
    };

    let mut res = json_response::deliver_success_json(Some(json!({
        "authority_id": authority_id,
        "message": "Authority updated",
    })))?;

    let headers = res.headers_mut();
    headers.insert(
        NEW_TOKEN_HEADER,
        HeaderValue::from_str(&issued.token).context("Token is not a valid header value")?,
    );
    headers.insert(NEW_EXPIRES_AT_HEADER, HeaderValue::from(issued.expires_at()));
    headers.insert(
        HeaderName::from_static("access-control-expose-headers"),
        HeaderValue::from_static("new-token, new-expires-at"),
    );

    Ok(utils::add_no_cache_headers(res))
}
