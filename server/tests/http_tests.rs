mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use common::*;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use server::AppState;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server::serve(listener, state, async {
            let _ = rx.await;
        }));
        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> (StatusCode, HeaderMap, Value) {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let res = sender.send_request(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, headers, value)
    }

    async fn get(&self, path: &str, auth: Option<(&str, String)>) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header("host", self.addr.to_string());
        if let Some((name, value)) = auth {
            builder = builder.header(name, value);
        }
        self.send(builder.body(Full::new(Bytes::new())).unwrap()).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: Value,
        token: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("host", self.addr.to_string())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(
            builder
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap(),
        )
        .await
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, _, body) = self
            .post_json(
                "/base/login",
                json!({ "username": username, "password": password }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }
}

fn bearer(token: &str) -> Option<(&'static str, String)> {
    Some(("authorization", format!("Bearer {}", token)))
}

fn assert_unauthorized(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        &json!({
            "status": "error",
            "code": "UNAUTHORIZED",
            "message": "Authentication required",
        })
    );
}

async fn start(use_multipoint: bool) -> (TestServer, Arc<FailingStore>) {
    let store = Arc::new(FailingStore::new());
    let state = app_state(use_multipoint, store.clone()).await;
    (TestServer::start(state).await, store)
}

#[tokio::test]
async fn health_reports_session_policy() {
    let (srv, _) = start(true).await;

    let (status, _, body) = srv.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["health"], "ok");
    assert_eq!(body["data"]["session_policy"], "single_session");

    srv.stop().await;
}

#[tokio::test]
async fn json_login_returns_token_and_identity() {
    let (srv, _) = start(true).await;

    let (status, headers, body) = srv
        .post_json(
            "/base/login",
            json!({ "userName": "alice", "passWord": ALICE_PASSWORD }),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["authority_id"], "888");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["token"].as_str().unwrap().split('.').count() == 3);
    assert!(body["expires_at"].as_i64().unwrap() > now());
    assert_eq!(headers["cache-control"], "no-cache, no-store, must-revalidate");

    srv.stop().await;
}

#[tokio::test]
async fn form_login_is_accepted() {
    let (srv, _) = start(false).await;

    let body = format!("username=bob&password={}", BOB_PASSWORD);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/base/login")
        .header("host", srv.addr.to_string())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from(body)))
        .unwrap();
    let (status, _, body) = srv.send(req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "bob");

    srv.stop().await;
}

#[tokio::test]
async fn failed_logins_are_indistinguishable() {
    let (srv, _) = start(true).await;

    let (s1, _, unknown) = srv
        .post_json(
            "/base/login",
            json!({ "username": "mallory", "password": "x" }),
            None,
        )
        .await;
    let (s2, _, wrong) = srv
        .post_json(
            "/base/login",
            json!({ "username": "alice", "password": "x" }),
            None,
        )
        .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
    assert_eq!(unknown["code"], "INVALID_CREDENTIALS");

    srv.stop().await;
}

#[tokio::test]
async fn login_without_password_is_bad_request() {
    let (srv, _) = start(true).await;

    let (status, _, body) = srv
        .post_json("/base/login", json!({ "username": "alice" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");

    srv.stop().await;
}

#[tokio::test]
async fn user_info_accepts_bearer_and_x_token() {
    let (srv, _) = start(true).await;
    let token = srv.login("alice", ALICE_PASSWORD).await;

    let (status, _, body) = srv.get("/user/getUserInfo", bearer(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["authority_ids"], json!(["888", "9528"]));

    let (status, _, body) = srv
        .get("/user/getUserInfo", Some(("x-token", token.clone())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nick_name"], "Alice");

    srv.stop().await;
}

#[tokio::test]
async fn every_rejection_looks_the_same() {
    let (srv, _) = start(true).await;
    let first = srv.login("alice", ALICE_PASSWORD).await;
    srv.login("alice", ALICE_PASSWORD).await;

    let t = now();
    let expired = codec()
        .sign(&claims_with_window(t - 7200, t - 10))
        .unwrap();
    let forged = foreign_codec()
        .sign(&claims_with_window(t, t + 600))
        .unwrap();

    let (status, _, body) = srv.get("/user/getUserInfo", None).await;
    assert_unauthorized(status, &body);

    for token in [first, expired, forged, "garbage".to_string()] {
        let (status, _, body) = srv.get("/user/getUserInfo", bearer(&token)).await;
        assert_unauthorized(status, &body);
    }

    srv.stop().await;
}

#[tokio::test]
async fn denylist_outage_rejects_requests() {
    let (srv, store) = start(true).await;
    let token = srv.login("alice", ALICE_PASSWORD).await;

    FailingStore::set(&store.fail_exists, true);
    let (status, _, body) = srv.get("/user/getUserInfo", bearer(&token)).await;
    assert_unauthorized(status, &body);

    FailingStore::set(&store.fail_exists, false);
    let (status, _, _) = srv.get("/user/getUserInfo", bearer(&token)).await;
    assert_eq!(status, StatusCode::OK);

    srv.stop().await;
}

#[tokio::test]
async fn store_outage_during_login_is_service_unavailable() {
    let (srv, store) = start(true).await;
    FailingStore::set(&store.fail_get, true);

    let (status, _, body) = srv
        .post_json(
            "/base/login",
            json!({ "username": "alice", "password": ALICE_PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "SESSION_UNAVAILABLE");
    assert!(body.get("token").is_none());

    srv.stop().await;
}

#[tokio::test]
async fn set_user_authority_returns_replacement_token() {
    let (srv, _) = start(true).await;
    let token = srv.login("alice", ALICE_PASSWORD).await;

    let (status, headers, body) = srv
        .post_json(
            "/user/setUserAuthority",
            json!({ "authorityId": "9528" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["authority_id"], "9528");

    let new_token = headers["new-token"].to_str().unwrap().to_string();
    assert_ne!(new_token, token);
    assert!(headers.contains_key("new-expires-at"));

    let (status, _, body) = srv.get("/user/getUserInfo", bearer(&new_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["authority_id"], "9528");

    let (status, _, body) = srv.get("/user/getUserInfo", bearer(&token)).await;
    assert_unauthorized(status, &body);

    srv.stop().await;
}

#[tokio::test]
async fn set_user_authority_refuses_unassigned_authority() {
    let (srv, _) = start(true).await;
    let token = srv.login("bob", BOB_PASSWORD).await;

    let (status, headers, body) = srv
        .post_json(
            "/user/setUserAuthority",
            json!({ "authorityId": "9528" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    assert!(!headers.contains_key("new-token"));

    srv.stop().await;
}

#[tokio::test]
async fn set_user_authority_requires_a_token() {
    let (srv, _) = start(true).await;

    let (status, _, body) = srv
        .post_json("/user/setUserAuthority", json!({ "authorityId": "888" }), None)
        .await;
    assert_unauthorized(status, &body);

    srv.stop().await;
}

#[tokio::test]
async fn stateless_mode_keeps_old_tokens_after_relogin() {
    let (srv, _) = start(false).await;
    let first = srv.login("alice", ALICE_PASSWORD).await;
    let second = srv.login("alice", ALICE_PASSWORD).await;

    for token in [first, second] {
        let (status, _, _) = srv.get("/user/getUserInfo", bearer(&token)).await;
        assert_eq!(status, StatusCode::OK);
    }

    srv.stop().await;
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (srv, _) = start(true).await;

    let (status, _, body) = srv.get("/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");

    srv.stop().await;
}
