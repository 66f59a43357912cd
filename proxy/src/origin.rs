use crate::config::{ConfigError, OriginConfig};
use crate::errors::ProxyError;
use bytes::Bytes;
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response, Version};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::http::{add_via_header, filter_hop_by_hop};
use std::future::Future;
use std::pin::Pin;

/// Forwards requests to the origin application, the filter's "next" service.
///
/// Bodies are streamed in both directions.
pub struct OriginService {
    client: Client<HttpConnector, Incoming>,
    scheme: http::uri::Scheme,
    authority: http::uri::Authority,
}

impl OriginService {
    pub fn try_new(config: &OriginConfig) -> Result<Self, ProxyError> {
        let uri: Uri = config.url.as_str().parse()?;
        let (scheme, authority) = match (uri.scheme(), uri.authority()) {
            (Some(scheme), Some(authority)) => (scheme.clone(), authority.clone()),
            _ => return Err(ConfigError::InvalidOriginUrl(config.url.to_string()).into()),
        };

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            client,
            scheme,
            authority,
        })
    }

    fn origin_uri(&self, original: &Uri) -> Result<Uri, http::Error> {
        let path_and_query = original
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl Service<Request<Incoming>> for OriginService {
    type Response = Response<BoxBody<Bytes, ProxyError>>;
    type Error = ProxyError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let (mut parts, body) = req.into_parts();
        let uri = self.origin_uri(&parts.uri);
        let client = self.client.clone();

        Box::pin(async move {
            parts.uri = uri?;
            filter_hop_by_hop(&mut parts.headers, parts.version);
            add_via_header(&mut parts.headers, parts.version);
            // The origin connection is always HTTP/1.1, whatever the client spoke.
            parts.version = Version::HTTP_11;

            let response = client.request(Request::from_parts(parts, body)).await?;

            let (mut parts, body) = response.into_parts();
            filter_hop_by_hop(&mut parts.headers, parts.version);
            add_via_header(&mut parts.headers, parts.version);

            Ok(Response::from_parts(
                parts,
                body.map_err(ProxyError::from).boxed(),
            ))
        })
    }
}
