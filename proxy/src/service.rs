use crate::errors::ProxyError;
use crate::metrics_defs::RENDER_ERRORS;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::service::Service as HyperService;
use hyper::{Request, Response, StatusCode};
use shared::counter;
use std::future::Future;
use std::pin::Pin;

/// Outermost service of the gateway listener.
///
/// Failures surfaced by the inner services end here: they are logged once and
/// answered with a gateway error instead of tearing down the connection.
pub struct GatewayService<S> {
    inner: S,
}

impl<S> GatewayService<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn error_response(status: StatusCode) -> Response<BoxBody<Bytes, ProxyError>> {
    let message = status.canonical_reason().unwrap_or("an error occurred");

    let mut response = Response::new(Full::new(message.into()).map_err(|e| match e {}).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

fn status_for(error: &ProxyError) -> StatusCode {
    if error.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl<S, B> HyperService<Request<B>> for GatewayService<S>
where
    S: HyperService<Request<B>, Response = Response<BoxBody<Bytes, ProxyError>>, Error = ProxyError>,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, ProxyError>>;
    type Error = ProxyError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let fut = self.inner.call(req);

        Box::pin(async move {
            match fut.await {
                Ok(response) => Ok(response),
                Err(e) => {
                    counter!(RENDER_ERRORS, "kind" => e.kind()).increment(1);
                    tracing::error!(%method, %path, error = %e, "Request failed");
                    Ok(error_response(status_for(&e)))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{Ready, ready};

    struct Failing(fn() -> ProxyError);

    impl HyperService<Request<()>> for Failing {
        type Response = Response<BoxBody<Bytes, ProxyError>>;
        type Error = ProxyError;
        type Future = Ready<Result<Self::Response, Self::Error>>;

        fn call(&self, _req: Request<()>) -> Self::Future {
            ready(Err((self.0)()))
        }
    }

    fn get() -> Request<()> {
        Request::builder().uri("/page").body(()).unwrap()
    }

    #[tokio::test]
    async fn test_maps_errors_to_gateway_statuses() {
        let timeout = GatewayService::new(Failing(|| {
            ProxyError::UpstreamTimeout("http://render/page".into())
        }));
        let response = timeout.call(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let status = GatewayService::new(Failing(|| {
            ProxyError::UpstreamStatus("http://render/page".into(), StatusCode::NOT_FOUND)
        }));
        let response = status.call(get()).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
