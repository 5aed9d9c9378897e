use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use hyper::{Request, Response};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

/// Tower layer logging one line per request: method, path, status and
/// latency.  Headers are never logged since they may carry tokens.
#[derive(Clone, Debug, Default)]
pub struct AccessLogLayer;

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct AccessLogService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AccessLogService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();
        let start = Instant::now();

        Box::pin(async move {
            let result = inner.call(req).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(response) if response.status().is_server_error() => {
                    warn!(%method, %path, status = response.status().as_u16(), elapsed_ms, "request")
                }
                Ok(response) if path == "/health" => {
                    debug!(%method, %path, status = response.status().as_u16(), elapsed_ms, "request")
                }
                Ok(response) => {
                    info!(%method, %path, status = response.status().as_u16(), elapsed_ms, "request")
                }
                Err(_) => warn!(%method, %path, elapsed_ms, "request failed"),
            }

            result
        })
    }
}
