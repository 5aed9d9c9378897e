//! JWT authentication server with optional single-session control.
//!
//! [`AppState::from_config`] wires the pieces together once at startup;
//! [`serve`] runs the HTTP accept loop until the shutdown future resolves.

pub mod audit;
pub mod auth;
pub mod database;
pub mod handlers;
pub mod session;
pub mod tower_middle;

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use shared::types::{AppConfig, StoreBackend};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::{ServiceBuilder, service_fn};
use tracing::{debug, info, warn};

use audit::{AuditSink, TracingAuditSink};
use auth::{
    AuthSessionManager, AuthorizationGate, ClaimsBuilder, SessionPolicy, SingleSessionPolicy,
    StatelessPolicy, TokenCodec,
};
use database::{SqliteUserRepository, UserRepository};
use handlers::http::routes::build_api_router;
use session::{InMemorySessionStore, RedisSessionStore, SessionStore};
use tower_middle::{AccessLogLayer, TimeoutLayer};

/// How often the in-memory store drops expired entries.
const MEMORY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Everything a request handler needs.  Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<AuthSessionManager>,
    pub gate: Arc<AuthorizationGate>,
}

impl AppState {
    /// Assemble the state from already constructed parts.
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        codec: Arc<TokenCodec>,
        policy: Arc<dyn SessionPolicy>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let sessions = AuthSessionManager::new(
            users,
            ClaimsBuilder::from_config(&config.auth),
            codec.clone(),
            policy.clone(),
            audit.clone(),
            config.database.timeout(),
        );
        let gate = AuthorizationGate::new(codec, policy, audit);

        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            gate: Arc::new(gate),
        }
    }

    /// Load keys, connect the session store and the user database.
    ///
    /// Any failure here is fatal: a node must not start with unusable key
    /// material or without the store its session policy depends on.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let codec = Arc::new(
            TokenCodec::from_config(&config.auth).context("Failed to load signing keys")?,
        );

        let policy = build_policy(&config, codec.clone()).await?;

        let users = SqliteUserRepository::connect(
            &config.database.url,
            config.database.max_connections,
        )
        .await
        .context("Failed to open user database")?;

        Ok(Self::new(
            config,
            Arc::new(users),
            codec,
            policy,
            Arc::new(TracingAuditSink),
        ))
    }
}

async fn build_policy(config: &AppConfig, codec: Arc<TokenCodec>) -> Result<Arc<dyn SessionPolicy>> {
    if !config.auth.use_multipoint {
        info!("Session policy: stateless (tokens valid until expiry)");
        return Ok(Arc::new(StatelessPolicy));
    }

    let session = &config.session;
    let store: Arc<dyn SessionStore> = match session.backend {
        StoreBackend::Redis => {
            let url = session
                .redis_url
                .as_deref()
                .context("session.redis_url is required for the redis backend")?;
            let store = RedisSessionStore::connect(url, session.key_prefix.clone(), session.timeout())
                .await
                .context("Failed to connect to redis session store")?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory session store; sessions are not shared between processes");
            let store = InMemorySessionStore::new(session.key_prefix.clone());
            spawn_purge_task(store.clone());
            Arc::new(store)
        }
    };

    info!(
        "Session policy: single session ({} store)",
        session.backend
    );
    Ok(Arc::new(SingleSessionPolicy::new(
        store,
        codec,
        config.auth.token_ttl(),
    )))
}

fn spawn_purge_task(store: InMemorySessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMORY_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            store.purge_expired().await;
        }
    });
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Connections already accepted are given one request timeout to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let router = Arc::new(build_api_router());
    let request_timeout = state.config.server.request_timeout();
    let mut connections = JoinSet::new();

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested; no longer accepting connections");
                break;
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let router = router.clone();
                let state = state.clone();
                let svc = ServiceBuilder::new()
                    .layer(AccessLogLayer)
                    .layer(TimeoutLayer::new(request_timeout))
                    .service(service_fn(move |req: Request<Incoming>| {
                        let router = router.clone();
                        let state = state.clone();
                        async move {
                            let req = req.map(BodyExt::boxed_unsync);
                            Ok::<_, Infallible>(handlers::http::handle(&router, req, state).await)
                        }
                    }));

                let io = TokioIo::new(stream);
                connections.spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(io, TowerToHyperService::new(svc))
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }
        }
    }

    if !connections.is_empty() {
        info!("Waiting for {} open connection(s)", connections.len());
        let drained = tokio::time::timeout(request_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Dropping {} connection(s) still open", connections.len());
            connections.abort_all();
        }
    }

    Ok(())
}
