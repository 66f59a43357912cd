use std::io;

use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("could not build upstream client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("render request to {0} timed out")]
    UpstreamTimeout(String),
    #[error("render request to {0} failed: {1}")]
    UpstreamRequestFailed(String, reqwest::Error),
    #[error("render service answered {1} for {0}")]
    UpstreamStatus(String, http::StatusCode),
    #[error("origin request failed: {0}")]
    OriginRequestFailed(#[from] hyper_util::client::legacy::Error),
    #[error("invalid origin URI: {0}")]
    InvalidOriginUri(#[from] http::uri::InvalidUri),
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("failed to build response: {0}")]
    Http(#[from] http::Error),
}

impl ProxyError {
    /// Classifies a reqwest failure against the render service at `url`.
    pub(crate) fn from_upstream(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProxyError::UpstreamTimeout(url.to_string())
        } else if let Some(status) = error.status() {
            ProxyError::UpstreamStatus(url.to_string(), status)
        } else {
            ProxyError::UpstreamRequestFailed(url.to_string(), error)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProxyError::UpstreamTimeout(_))
    }

    /// Short label used to tag error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Io(_) => "io",
            ProxyError::Config(_) => "config",
            ProxyError::ClientBuild(_) => "client_build",
            ProxyError::UpstreamTimeout(_) => "upstream_timeout",
            ProxyError::UpstreamRequestFailed(..) => "upstream_request",
            ProxyError::UpstreamStatus(..) => "upstream_status",
            ProxyError::OriginRequestFailed(_) => "origin_request",
            ProxyError::InvalidOriginUri(_) => "origin_uri",
            ProxyError::Hyper(_) => "hyper",
            ProxyError::Http(_) => "http",
        }
    }
}
