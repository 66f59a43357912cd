//! Serves pre-rendered snapshots to crawlers in front of an origin application.
//!
//! [`filter::InterceptFilter`] decides per request whether the snapshot from the
//! rendering service is served; [`run`] wires it between a listener and the origin.

pub mod config;
pub mod errors;
pub mod filter;
pub mod metrics_defs;
pub mod origin;
pub mod relay;
pub mod service;
#[cfg(test)]
mod testutils;

pub use errors::ProxyError;
pub use filter::{Decision, InterceptFilter, RenderLayer, RenderService};

use filter::FilterSettings;
use origin::OriginService;
use service::GatewayService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use tower::Layer;

/// Builds the gateway service chain: error mapping, render filter, origin.
pub fn gateway(
    config: &config::Config,
) -> Result<GatewayService<RenderService<OriginService>>, ProxyError> {
    config.validate()?;
    let settings = FilterSettings::try_from(&config.render)?;
    tracing::info!(
        upstream = settings.upstream_base(),
        origin = %config.origin.url,
        "Render filter configured"
    );

    let filter = Arc::new(InterceptFilter::from_settings(settings)?);
    let origin = OriginService::try_new(&config.origin)?;
    Ok(GatewayService::new(RenderLayer::new(filter).layer(origin)))
}

pub async fn run(config: config::Config) -> Result<(), ProxyError> {
    let gateway = gateway(&config)?;

    let proxy_task = run_http_service(&config.listener.host, config.listener.port, gateway);
    // Configuration is resolved before the listeners start.
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, ProxyError>::new(|| true),
    );

    tokio::try_join!(proxy_task, admin_task)?;
    Ok(())
}
