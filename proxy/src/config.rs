use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Default origin of the rendering service.
pub const DEFAULT_URL_API: &str = "https://api.seo4ajax.com/";

/// User agents that get the rendered snapshot unless `regexpBots` says otherwise.
///
/// Case-insensitive so that vendor casings such as `Mediapartners-Google` are caught.
pub const DEFAULT_REGEXP_BOTS: &str = "(?i).*(bot|lighthouse|spider|pinterest|crawler|archiver|flipboardproxy|mediapartners|facebookexternalhit|quora).*";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("siteToken parameter not set")]
    MissingSiteToken,

    #[error("invalid regexpBots pattern: {0}")]
    InvalidBotPattern(#[from] regex::Error),

    #[error("{0} cannot be 0")]
    ZeroTimeout(&'static str),

    #[error("origin URL {0} has no host")]
    InvalidOriginUrl(String),

    #[error("unsupported origin scheme {0}, only http is supported")]
    UnsupportedOriginScheme(String),
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    pub listener: Listener,
    /// Admin listener for health endpoints
    pub admin_listener: Listener,
    /// Application that receives every request the filter does not render
    pub origin: OriginConfig,
    /// Render filter settings
    pub render: RenderConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.origin.validate()?;
        self.render.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OriginConfig {
    /// Base URL of the origin application. Its path is ignored, the inbound
    /// path and query are used as-is.
    pub url: Url,
}

impl OriginConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.scheme() != "http" {
            return Err(ConfigError::UnsupportedOriginScheme(
                self.url.scheme().to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the render filter, named after the filter's init parameters.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// Account token on the rendering service. Required.
    pub site_token: Option<String>,
    /// Regular expression the whole User-Agent header must match.
    #[serde(default = "default_regexp_bots")]
    pub regexp_bots: String,
    /// Origin of the rendering service, the site token is appended to it.
    #[serde(default = "default_url_api")]
    pub url_api: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl RenderConfig {
    /// Configuration with every optional setting left at its default.
    pub fn new(site_token: impl Into<String>) -> Self {
        Self {
            site_token: Some(site_token.into()),
            regexp_bots: default_regexp_bots(),
            url_api: default_url_api(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// Returns the site token, rejecting a missing or empty one.
    pub fn site_token(&self) -> Result<&str, ConfigError> {
        self.site_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingSiteToken)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.site_token()?;
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connectTimeoutMs"));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("readTimeoutMs"));
        }
        Ok(())
    }
}

fn default_regexp_bots() -> String {
    DEFAULT_REGEXP_BOTS.to_string()
}

fn default_url_api() -> String {
    DEFAULT_URL_API.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}
