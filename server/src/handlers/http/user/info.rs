use anyhow::Result;
use tracing::debug;

use crate::AppState;
use crate::auth::AuthContext;
use crate::handlers::http::utils::json_response;
use crate::handlers::http::{HttpRequest, HttpResponse, deliver_auth_error};

/// `GET /user/getUserInfo`: the caller's current identity summary.
pub async fn handle_get_user_info(
    _req: HttpRequest,
    state: AppState,
    ctx: AuthContext,
) -> Result<HttpResponse> {
    debug!("User info requested by {}", ctx.claims.username);

    match state.sessions.user_info(&ctx.claims.username).await {
        Ok(summary) => json_response::deliver_success_json(Some(summary)),
        Err(e) => deliver_auth_error(&e),
    }
}
