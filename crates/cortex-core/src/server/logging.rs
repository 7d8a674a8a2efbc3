//! Logging middleware for HTTP requests with request IDs and timing.

use std::task::{Context, Poll};
use std::time::Instant;

use http::{HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A `Layer` that adds logging with request IDs and timing to requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggerService { service }
    }
}

/// A `Service` that logs request information with request IDs and timing.
#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    service: S,
}

impl<S, B, ResBody> Service<Request<B>> for RequestLoggerService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        let header_value = HeaderValue::from_str(&request_id).ok();

        if !request.headers().contains_key(REQUEST_ID_HEADER) {
            if let Some(value) = header_value.clone() {
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let start_time = Instant::now();

        let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);
        debug!(parent: &span, "Received request");

        let future = self.service.call(request);
        Box::pin(
            async move {
                let result = future.await;
                let latency_ms = start_time.elapsed().as_millis();

                match result {
                    Ok(mut response) => {
                        let status = response.status();
                        if let Some(value) = header_value {
                            response.headers_mut().insert(REQUEST_ID_HEADER, value);
                        }
                        if status.is_server_error() {
                            warn!(status = status.as_u16(), latency_ms, "Request failed");
                        } else {
                            info!(status = status.as_u16(), latency_ms, "Request completed");
                        }
                        Ok(response)
                    }
                    Err(e) => {
                        warn!(latency_ms, "Request errored");
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }
}
