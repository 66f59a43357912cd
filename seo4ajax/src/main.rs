mod config;

use clap::{Args, Parser, Subcommand};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "seo4ajax", about = "Serves pre-rendered pages to crawlers")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the gateway
    Proxy(ConfigArgs),
    /// Validate the configuration file and exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, default_value = "seo4ajax.yaml")]
    config_file_path: PathBuf,
}

fn init_logging(logging: Option<&config::LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let sentry_guard = logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(sentry_guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    sentry_guard
}

fn init_metrics(metrics_config: Option<&config::MetricsConfig>) {
    let Some(metrics_config) = metrics_config else {
        return;
    };

    let recorder = match StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some("seo4ajax"))
    {
        Ok(recorder) => recorder,
        Err(e) => {
            tracing::error!(error = %e, "Could not create statsd recorder, metrics disabled");
            return;
        }
    };

    if let Err(e) = metrics::set_global_recorder(recorder) {
        tracing::error!(error = %e, "Could not install metrics recorder");
        return;
    }
    shared::metrics_defs::describe_all(proxy::metrics_defs::ALL_METRICS);
}

fn main() {
    let cli = Cli::parse();

    let (args, serve) = match cli.command {
        CliCommand::Proxy(args) => (args, true),
        CliCommand::CheckConfig(args) => (args, false),
    };

    let config = match config::Config::from_file(&args.config_file_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", args.config_file_path.display());
            process::exit(1);
        }
    };

    if !serve {
        if let Err(e) = proxy::gateway(&config.proxy) {
            eprintln!("{}: {e}", args.config_file_path.display());
            process::exit(1);
        }
        println!("{}: ok", args.config_file_path.display());
        return;
    }

    let _sentry_guard = init_logging(config.common.logging.as_ref());
    init_metrics(config.common.metrics.as_ref());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            process::exit(1);
        }
    };

    tracing::info!("Starting proxy");
    if let Err(e) = runtime.block_on(proxy::run(config.proxy)) {
        tracing::error!(error = %e, "Proxy stopped");
        process::exit(1);
    }
}
