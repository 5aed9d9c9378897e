#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use server::AppState;
use server::audit::{AuditEvent, AuditSink};
use server::auth::{
    AuthSessionManager, AuthorizationGate, ClaimsBuilder, SessionPolicy, SingleSessionPolicy,
    StatelessPolicy, TokenCodec,
};
use server::database::utils::get_timestamp;
use server::database::{NewUser, SqliteUserRepository, UserRepository};
use server::session::{InMemorySessionStore, Lookup, SessionStore, StoreError};
use shared::config::parse_config;
use shared::types::server_config::SigningAlgorithm;
use shared::types::{AppConfig, Claims};
use uuid::Uuid;

pub const PRIVATE: &[u8] = include_bytes!("../fixtures/private_key.pem");
pub const PUBLIC: &[u8] = include_bytes!("../fixtures/rsa_public_key.pem");
pub const OTHER_PRIVATE: &[u8] = include_bytes!("../fixtures/other_private_key.pem");
pub const OTHER_PUBLIC: &[u8] = include_bytes!("../fixtures/other_public_key.pem");

pub const ISSUER: &str = "auth-server";
pub const AUDIENCE: &str = "admin-console";
pub const TTL: Duration = Duration::from_secs(3600);

pub const ALICE_PASSWORD: &str = "alice-password";
pub const BOB_PASSWORD: &str = "bob-password";

pub fn codec() -> Arc<TokenCodec> {
    Arc::new(
        TokenCodec::from_pem(SigningAlgorithm::Rs256, Some(PRIVATE), PUBLIC, ISSUER, AUDIENCE, 0)
            .unwrap(),
    )
}

/// The fixture codec with a verification leeway of `secs`.
pub fn codec_with_leeway(secs: u64) -> Arc<TokenCodec> {
    Arc::new(
        TokenCodec::from_pem(SigningAlgorithm::Rs256, Some(PRIVATE), PUBLIC, ISSUER, AUDIENCE, secs)
            .unwrap(),
    )
}

/// A codec holding a different key pair than [`codec`].
pub fn foreign_codec() -> TokenCodec {
    TokenCodec::from_pem(
        SigningAlgorithm::Rs256,
        Some(OTHER_PRIVATE),
        OTHER_PUBLIC,
        ISSUER,
        AUDIENCE,
        0,
    )
    .unwrap()
}

pub fn builder() -> ClaimsBuilder {
    ClaimsBuilder::new(TTL, ISSUER, AUDIENCE).with_not_before_skew(Duration::from_secs(60))
}

/// Claims for alice with an explicit validity window.
pub fn claims_with_window(iat: i64, exp: i64) -> Claims {
    Claims {
        uuid: Uuid::new_v4(),
        id: 1,
        nick_name: "Alice".into(),
        username: "alice".into(),
        authority_id: "888".into(),
        iss: ISSUER.into(),
        sub: "alice".into(),
        aud: AUDIENCE.into(),
        iat,
        nbf: iat,
        exp,
        jti: Uuid::new_v4().to_string(),
    }
}

pub fn now() -> i64 {
    get_timestamp()
}

// ---------------------------------------------------------------------------
// Session store with switchable failures
// ---------------------------------------------------------------------------

/// In-memory store whose individual operations can be made to fail.
pub struct FailingStore {
    inner: InMemorySessionStore,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_denylist: AtomicBool,
    pub fail_exists: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemorySessionStore::new("test"),
            fail_get: AtomicBool::new(false),
            fail_set: AtomicBool::new(false),
            fail_denylist: AtomicBool::new(false),
            fail_exists: AtomicBool::new(false),
        }
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn get_current_token(&self, username: &str) -> Result<Lookup<String>, StoreError> {
        Self::check(&self.fail_get)?;
        self.inner.get_current_token(username).await
    }

    async fn set_current_token(
        &self,
        username: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_set)?;
        self.inner.set_current_token(username, token, ttl).await
    }

    async fn denylist(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        Self::check(&self.fail_denylist)?;
        self.inner.denylist(token, ttl).await
    }

    async fn is_denylisted(&self, token: &str) -> Result<bool, StoreError> {
        Self::check(&self.fail_exists)?;
        self.inner.is_denylisted(token).await
    }
}

// ---------------------------------------------------------------------------
// Audit sink that remembers what it saw
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn login_failure_reasons(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::LoginFailed { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }

    pub fn rejection_reasons(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::TokenRejected { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// In-memory user database with alice (888, 9528) and bob (888).
pub async fn users() -> Arc<SqliteUserRepository> {
    let repo = SqliteUserRepository::connect("sqlite::memory:", 1)
        .await
        .unwrap();

    repo.create_user(NewUser {
        username: "alice".into(),
        password: ALICE_PASSWORD.into(),
        nick_name: "Alice".into(),
        authority_id: "888".into(),
        extra_authorities: vec!["9528".into()],
    })
    .await
    .unwrap();

    repo.create_user(NewUser {
        username: "bob".into(),
        password: BOB_PASSWORD.into(),
        nick_name: "Bob".into(),
        authority_id: "888".into(),
        extra_authorities: vec![],
    })
    .await
    .unwrap();

    Arc::new(repo)
}

// ---------------------------------------------------------------------------
// Assembled manager + gate
// ---------------------------------------------------------------------------

pub struct Harness {
    pub manager: AuthSessionManager,
    pub gate: AuthorizationGate,
    pub store: Arc<FailingStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub codec: Arc<TokenCodec>,
}

pub async fn harness(single_session: bool) -> Harness {
    harness_with_users(single_session, users().await).await
}

pub async fn harness_with_users(single_session: bool, users: Arc<dyn UserRepository>) -> Harness {
    let codec = codec();
    let store = Arc::new(FailingStore::new());
    let audit = Arc::new(RecordingAuditSink::default());

    let policy: Arc<dyn SessionPolicy> = if single_session {
        Arc::new(SingleSessionPolicy::new(store.clone(), codec.clone(), TTL))
    } else {
        Arc::new(StatelessPolicy)
    };

    Harness {
        manager: AuthSessionManager::new(
            users,
            builder(),
            codec.clone(),
            policy.clone(),
            audit.clone(),
            Duration::from_secs(2),
        ),
        gate: AuthorizationGate::new(codec.clone(), policy, audit.clone()),
        store,
        audit,
        codec,
    }
}

// ---------------------------------------------------------------------------
// Full application state for HTTP tests
// ---------------------------------------------------------------------------

pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn test_config(use_multipoint: bool, request_timeout_secs: u64) -> AppConfig {
    let toml = format!(
        r#"
[server]
bind = "127.0.0.1"
port = 0
request_timeout_secs = {request_timeout_secs}

[auth]
algorithm = "RS256"
private_key_path = "{private}"
public_key_path = "{public}"
token_ttl_secs = 3600
issuer = "{ISSUER}"
audience = "{AUDIENCE}"
use_multipoint = {use_multipoint}

[session]
backend = "memory"

[database]
url = "sqlite::memory:"
"#,
        private = fixture_path("private_key.pem"),
        public = fixture_path("rsa_public_key.pem"),
    );
    parse_config(&toml).unwrap()
}

/// State over the fixture keys, an in-memory user database and `store`.
pub async fn app_state(use_multipoint: bool, store: Arc<FailingStore>) -> AppState {
    let config = test_config(use_multipoint, 10);
    let codec = codec();
    let policy: Arc<dyn SessionPolicy> = if use_multipoint {
        Arc::new(SingleSessionPolicy::new(store, codec.clone(), TTL))
    } else {
        Arc::new(StatelessPolicy)
    };
    AppState::new(
        config,
        users().await,
        codec,
        policy,
        Arc::new(RecordingAuditSink::default()),
    )
}
