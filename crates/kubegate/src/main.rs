//! kubegate - Kubernetes-API-compatible gateway over isolated, shared and
//! federated clusters

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use kubegate_api::{start_server, MemberClient, Registry, ReqwestMemberClient, ServerConfig};
use kubegate_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use kubegate_common::{GatewayConfig, StaticCredentialStore};

/// kubegate - one Kubernetes API endpoint for many clusters
#[derive(Parser, Debug)]
#[command(name = "kubegate", version, about, long_about = None)]
struct Cli {
    /// Path to the gateway configuration file
    #[arg(
        short = 'c',
        long = "config",
        env = "KUBEGATE_CONFIG",
        default_value = "/etc/kubegate/config.yaml"
    )]
    config: PathBuf,

    /// Log line format: json or text
    #[arg(long, env = "KUBEGATE_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Listen address, overriding `listenAddr` from the configuration
    #[arg(long, env = "KUBEGATE_LISTEN")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Member connections and the HTTPS listener both need a process-wide provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    let config = GatewayConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let credentials = StaticCredentialStore::from_specs(&config.credentials)
        .context("Failed to resolve member credentials")?;

    let timeout = Duration::from_secs(config.member_timeout_seconds);
    let registry = Registry::from_config(&config, &credentials, |member, credential| {
        let client = ReqwestMemberClient::new(member, credential, timeout)?;
        Ok(Arc::new(client) as Arc<dyn MemberClient>)
    })
    .context("Failed to build cluster registry")?;

    info!(
        clusters = registry.len(),
        member_timeout_secs = config.member_timeout_seconds,
        "Cluster registry loaded"
    );

    let server_config = ServerConfig {
        addr: cli.listen.unwrap_or(config.listen_addr),
        tls: config.tls.clone(),
    };

    start_server(server_config, Arc::new(registry)).await?;
    Ok(())
}
