use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use hyper::{Method, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::AppState;
use crate::auth::AuthContext;
use crate::handlers::http::utils::json_response;
use crate::handlers::http::{HttpRequest, HttpResponse, auth, user};

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Two tiers:
//
//   RouteHandler    no auth.  Receives (req, state).
//                   Use for: /base/login, /health.
//
//   GuardedHandler  token verified by the AuthorizationGate (signature,
//                   validity window, session policy).  Receives
//                   (req, state, ctx).

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

type RouteHandler = Box<dyn Fn(HttpRequest, AppState) -> HandlerFuture + Send + Sync>;

type GuardedHandler =
    Box<dyn Fn(HttpRequest, AppState, AuthContext) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(RouteHandler),
    Guarded(GuardedHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    fn guarded<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Guarded(Box::new(move |req, state, ctx| {
                Box::pin(handler(req, state, ctx))
            })),
        });
        self
    }

    /// GET with no authentication.
    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::GET, path, handler)
    }

    /// POST with no authentication; login only.
    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.open(Method::POST, path, handler)
    }

    pub fn get_guarded<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.guarded(Method::GET, path, handler)
    }

    pub fn post_guarded<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, AppState, AuthContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.guarded(Method::POST, path, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, mut req: HttpRequest, state: AppState) -> Result<HttpResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        for route in &self.routes {
            if route.method != method || !Self::path_matches(&route.path, &path) {
                continue;
            }

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,

                RouteKind::Guarded(h) => match state.gate.authorize_request(&mut req).await {
                    Ok(ctx) => h(req, state, ctx).await,
                    Err(e) => {
                        // The reason was logged and audited by the gate; the
                        // caller only ever sees the uniform rejection.
                        debug!("Rejected {} {}: {}", method, path, e.as_str());
                        unauthorized()
                    }
                },
            };
        }

        json_response::deliver_error_json("NOT_FOUND", "Endpoint not found", StatusCode::NOT_FOUND)
            .context("Failed to deliver 404 response")
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| r.starts_with(':') || r == p)
    }
}

pub fn unauthorized() -> Result<HttpResponse> {
    json_response::deliver_error_json(
        "UNAUTHORIZED",
        "Authentication required",
        StatusCode::UNAUTHORIZED,
    )
    .context("Failed to deliver 401 response")
}

// ---------------------------------------------------------------------------
// API router
//
// Auth is enforced here at the routing level; guarded handlers receive the
// verified `AuthContext` and must not repeat the check.
// ---------------------------------------------------------------------------

pub fn build_api_router() -> Router {
    Router::new()
        .get("/health", |_req, state| async move {
            json_response::deliver_success_json(Some(json!({
                "health": "ok",
                "session_policy": state.sessions.policy_name(),
            })))
        })
        .post("/base/login", |req, state| async move {
            auth::handle_login(req, state).await.context("Login failed")
        })
        .get_guarded("/user/getUserInfo", |req, state, ctx| async move {
            user::handle_get_user_info(req, state, ctx)
                .await
                .context("User info failed")
        })
        .post_guarded("/user/setUserAuthority", |req, state, ctx| async move {
            user::handle_set_user_authority(req, state, ctx)
                .await
                .context("Set authority failed")
        })
}
