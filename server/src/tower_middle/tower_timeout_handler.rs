use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::{Request, Response, StatusCode};
use tokio::time;
use tower::{Layer, Service};

use crate::handlers::http::HttpBody;
use crate::handlers::http::utils::json_response;

/// Tower layer for request timeouts
///
/// If the inner service does not respond within the configured
/// duration, a 408 Request Timeout JSON response is returned.  Work still
/// pending in the inner future is dropped.
#[derive(Clone, Debug)]
pub struct TimeoutLayer {
    duration: Duration,
}

impl TimeoutLayer {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            duration: self.duration,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TimeoutService<S> {
    inner: S,
    duration: Duration,
}

fn timeout_response() -> Response<HttpBody> {
    json_response::deliver_error_json(
        "REQUEST_TIMEOUT",
        "The request took too long to complete",
        StatusCode::REQUEST_TIMEOUT,
    )
    .unwrap_or_else(|_| {
        let mut res = json_response::internal_error();
        *res.status_mut() = StatusCode::REQUEST_TIMEOUT;
        res
    })
}

impl<S, ReqBody> Service<Request<ReqBody>> for TimeoutService<S>
where
    S: Service<Request<ReqBody>, Response = Response<HttpBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let duration = self.duration;
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match time::timeout(duration, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Request to {} timed out after {:?}", path, duration);
                    Ok(timeout_response())
                }
            }
        })
    }
}
