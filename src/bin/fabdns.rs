//! fabdns binary entry point: the authoritative DNS server.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fab_dns::dns::parse_settings;
use fab_dns::hub::{tls, ApiClient, GlobalServiceImporter};
use fab_dns::{telemetry, DnsServer, Error, GlobalServiceStore, TelemetryConfig};

/// Authoritative DNS server for multi-cluster global services.
#[derive(Parser, Debug)]
#[command(name = "fabdns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the plugin configuration block.
    #[arg(short, long, default_value = "fabdns.conf")]
    config: PathBuf,

    /// Address to serve DNS on (UDP and TCP).
    #[arg(long, default_value = "0.0.0.0:5353")]
    listen_address: SocketAddr,

    /// Hub API server address; when set, the catalog is imported from it
    /// periodically.
    #[arg(long, default_value = "")]
    api_server_address: String,

    /// TLS key file for the hub connection.
    #[arg(long)]
    tls_key_file: Option<PathBuf>,

    /// TLS cert file for the hub connection.
    #[arg(long)]
    tls_cert_file: Option<PathBuf>,

    /// CA cert file the hub's certificate must chain to.
    #[arg(long)]
    tls_ca_cert_file: Option<PathBuf>,

    /// Interval between catalog imports.
    #[arg(long, default_value = "1m", value_parser = humantime::parse_duration)]
    service_import_interval: Duration,

    /// Timeout for hub requests.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,

    /// Prometheus metrics listen address.
    #[arg(long)]
    metrics_listen_address: Option<SocketAddr>,

    /// Log level filter.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    telemetry::init(&TelemetryConfig {
        log_level: args.log_level.clone(),
        prometheus_addr: args.metrics_listen_address,
    })
    .map_err(|e| e as Box<dyn std::error::Error>)?;

    let block = std::fs::read_to_string(&args.config)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", args.config.display())))?;
    let settings = parse_settings(&block)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %args.listen_address,
        cluster = %settings.cluster.name,
        "starting fabdns"
    );

    let cancel = CancellationToken::new();
    let store = GlobalServiceStore::new();

    let importer_handle = if args.api_server_address.is_empty() {
        None
    } else {
        let (key, cert, ca) = match (&args.tls_key_file, &args.tls_cert_file, &args.tls_ca_cert_file)
        {
            (Some(key), Some(cert), Some(ca)) => (key, cert, ca),
            _ => {
                return Err(Error::Config(
                    "tls-key-file, tls-cert-file and tls-ca-cert-file are required \
                     when api-server-address is set"
                        .to_string(),
                )
                .into());
            }
        };

        let client_tls = tls::client_tls(cert, key, ca)?;
        let client = Arc::new(ApiClient::new(
            &args.api_server_address,
            &settings.cluster.name,
            client_tls,
            args.request_timeout,
        )?);

        if let Err(e) = client.heartbeat().await {
            error!(error = %e, "failed to send initial heartbeat");
        }

        let importer = GlobalServiceImporter::new(
            client,
            store.clone(),
            args.service_import_interval,
            true,
        );
        info!(hub = %args.api_server_address, "catalog import enabled");
        Some(tokio::spawn(importer.run(cancel.clone())))
    };

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    let server = DnsServer::new(args.listen_address, settings, store);
    let result = server.run(cancel.clone()).await;

    cancel.cancel();
    if let Some(handle) = importer_handle {
        let _ = handle.await;
    }

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("fabdns shutdown complete");
    Ok(())
}
