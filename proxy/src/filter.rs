//! The render filter.
//!
//! Every inbound request is classified by [`InterceptFilter::decide`]. Requests
//! carrying the escaped-fragment marker, or coming from a user agent matching
//! the bot pattern, are answered with the snapshot served by the rendering
//! service; everything else goes to the next service untouched.

use crate::config::{ConfigError, RenderConfig};
use crate::errors::ProxyError;
use crate::metrics_defs::{DECISIONS, RENDER_BYTES, RENDER_DURATION};
use crate::relay::{self, RELAY_CAPACITY, RelayError};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use regex::Regex;
use shared::{counter, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::Layer;

/// Query string suffix sent by crawlers following the AJAX crawling scheme.
pub const ESCAPED_FRAGMENT_MARKER: &str = "_escaped_fragment_=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    EscapedFragment,
    Bot,
    PassThrough,
}

impl Decision {
    pub fn is_render(self) -> bool {
        !matches!(self, Decision::PassThrough)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::EscapedFragment => "escaped_fragment",
            Decision::Bot => "bot",
            Decision::PassThrough => "pass_through",
        }
    }
}

/// Resolved, immutable form of a [`RenderConfig`].
#[derive(Debug)]
pub struct FilterSettings {
    upstream_base: String,
    bots: Regex,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl FilterSettings {
    /// `urlApi` followed by the site token.
    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl TryFrom<&RenderConfig> for FilterSettings {
    type Error = ConfigError;

    fn try_from(config: &RenderConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        let site_token = config.site_token()?;
        // The whole header has to match, not a substring of it.
        let bots = Regex::new(&format!("^(?:{})$", config.regexp_bots))?;

        Ok(Self {
            upstream_base: format!("{}{}", config.url_api, site_token),
            bots,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
        })
    }
}

pub struct InterceptFilter {
    settings: FilterSettings,
    client: reqwest::Client,
}

impl InterceptFilter {
    pub fn new(config: &RenderConfig) -> Result<Self, ProxyError> {
        Self::from_settings(FilterSettings::try_from(config)?)
    }

    pub fn from_settings(settings: FilterSettings) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .map_err(ProxyError::ClientBuild)?;

        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn decide<B>(&self, req: &Request<B>) -> Decision {
        // Header values may carry obs-text, which still has to be matched.
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .map(|value| String::from_utf8_lossy(value.as_bytes()));
        self.decide_parts(req.uri().query(), user_agent.as_deref())
    }

    /// The escaped-fragment marker wins over the user agent check.
    pub fn decide_parts(&self, query: Option<&str>, user_agent: Option<&str>) -> Decision {
        if query.is_some_and(|q| q.ends_with(ESCAPED_FRAGMENT_MARKER)) {
            return Decision::EscapedFragment;
        }
        match user_agent {
            Some(ua) if self.settings.bots.is_match(ua) => Decision::Bot,
            _ => Decision::PassThrough,
        }
    }

    /// Snapshot URL for `path`, the query string is appended verbatim.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.settings.upstream_base, path, q),
            _ => format!("{}{}", self.settings.upstream_base, path),
        }
    }

    /// Fetches the snapshot at `url` and returns a response streaming it.
    ///
    /// Only fails before the response head is produced. Read errors after
    /// that point abort the returned body instead.
    pub async fn render(
        &self,
        url: &str,
    ) -> Result<Response<BoxBody<Bytes, ProxyError>>, ProxyError> {
        let started = Instant::now();
        let upstream = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ProxyError::from_upstream(url, e))?;
        histogram!(RENDER_DURATION).record(started.elapsed().as_secs_f64());

        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        let (sink, body) = relay::channel(RELAY_CAPACITY);

        let url = url.to_string();
        tokio::spawn(async move {
            match relay::copy(upstream, sink).await {
                Ok(written) => {
                    histogram!(RENDER_BYTES, "outcome" => "complete").record(written as f64);
                    tracing::debug!(%url, written, "Snapshot relayed");
                }
                Err(RelayError::SinkClosed(written)) => {
                    histogram!(RENDER_BYTES, "outcome" => "client_gone").record(written as f64);
                    tracing::debug!(%url, written, "Client went away during snapshot relay");
                }
                Err(e @ RelayError::UpstreamRead { .. }) => {
                    tracing::error!(%url, error = %e, "Snapshot relay failed");
                }
            }
        });

        let mut builder = Response::builder().status(StatusCode::OK);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        Ok(builder.body(body.boxed())?)
    }
}

/// Wraps the next service with an [`InterceptFilter`].
#[derive(Clone)]
pub struct RenderLayer {
    filter: Arc<InterceptFilter>,
}

impl RenderLayer {
    pub fn new(filter: Arc<InterceptFilter>) -> Self {
        Self { filter }
    }
}

impl<S> Layer<S> for RenderLayer {
    type Service = RenderService<S>;

    fn layer(&self, next: S) -> Self::Service {
        RenderService {
            filter: self.filter.clone(),
            next,
        }
    }
}

pub struct RenderService<S> {
    filter: Arc<InterceptFilter>,
    next: S,
}

impl<S, B> Service<Request<B>> for RenderService<S>
where
    S: Service<Request<B>, Response = Response<BoxBody<Bytes, ProxyError>>, Error = ProxyError>,
    S::Future: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, ProxyError>>;
    type Error = ProxyError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let decision = self.filter.decide(&req);
        counter!(DECISIONS, "decision" => decision.as_str()).increment(1);

        if !decision.is_render() {
            return Box::pin(self.next.call(req));
        }

        let url = self.filter.upstream_url(req.uri().path(), req.uri().query());
        tracing::debug!(%url, decision = decision.as_str(), "Serving snapshot");
        let filter = self.filter.clone();

        Box::pin(async move { filter.render(&url).await })
    }
}
