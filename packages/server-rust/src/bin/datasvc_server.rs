//! datasvc server process.
//!
//! Binds the HTTP listener, optionally registers with Consul, serves until
//! Ctrl-C, drains in-flight requests and deregisters.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use datasvc_server::{
    ConsulRegistrar, NetworkConfig, NetworkModule, NoteStore, RegistrationConfig,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// datasvc note server
#[derive(Debug, Parser)]
#[command(name = "datasvc-server", version, about, long_about = None)]
struct Cli {
    /// Bind address
    #[arg(long, env = "DATASVC_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port (0 picks a free one)
    #[arg(long, env = "DATASVC_PORT", default_value_t = 8080)]
    port: u16,

    /// Per-request timeout in seconds
    #[arg(long, env = "DATASVC_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests, in seconds
    #[arg(long, env = "DATASVC_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Consul agent URL; registration is skipped when unset
    #[arg(long, env = "CONSUL_ADDR")]
    consul: Option<String>,

    /// Address advertised to Consul
    #[arg(long, env = "DATASVC_ADVERTISE_HOST", default_value = "127.0.0.1")]
    advertise_host: String,

    /// Service name registered with Consul
    #[arg(long, env = "DATASVC_SERVICE_NAME", default_value = "datasvc")]
    service_name: String,

    /// Tags registered with Consul
    #[arg(long = "tag", env = "DATASVC_TAGS", value_delimiter = ',', default_value = "prod")]
    tags: Vec<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "DATASVC_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, env = "DATASVC_LOG_FORMAT", value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install prometheus exporter")?;
        info!(%addr, "prometheus exporter listening");
    }

    let config = NetworkConfig {
        host: cli.host.clone(),
        port: cli.port,
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
        drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(config, Arc::new(NoteStore::new()));
    let port = module.start().await.context("failed to bind listener")?;

    let registrar = match cli.consul {
        Some(consul_addr) => {
            let registrar = ConsulRegistrar::new(
                RegistrationConfig {
                    consul_addr,
                    service_name: cli.service_name,
                    tags: cli.tags,
                    advertise_host: cli.advertise_host,
                    ..RegistrationConfig::default()
                },
                port,
            );
            registrar
                .register()
                .await
                .context("failed to register with consul")?;
            Some(registrar)
        }
        None => None,
    };

    let served = module.serve(shutdown_signal()).await;

    if let Some(registrar) = registrar {
        if let Err(e) = registrar.deregister().await {
            warn!(error = %e, "failed to deregister from consul");
        }
    }

    served
}
