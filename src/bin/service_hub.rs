//! service-hub binary entry point: the federation control plane.

use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fab_dns::config::{is_valid_cluster_name, is_valid_zone_name};
use fab_dns::hub::{
    api_server, cluster, tls, ApiClient, ApiServer, ClusterCleaner, ClusterStore,
    GlobalServiceImporter, GlobalServiceManager,
};
use fab_dns::{telemetry, Error, GlobalServiceStore, TelemetryConfig};

const MODE_SERVER: &str = "server";
const MODE_CLIENT: &str = "client";

/// Cluster-federated control plane for fab-dns global services.
#[derive(Parser, Debug)]
#[command(name = "service-hub")]
#[command(version, about, long_about = None)]
struct Args {
    /// "server" hosts the hub API; "client" exports to and imports from a
    /// remote hub.
    #[arg(long, default_value = MODE_SERVER)]
    mode: String,

    /// Name of this cluster; must be a valid DNS name (RFC 1123) unique
    /// among all clusters.
    #[arg(long, default_value = "")]
    cluster: String,

    /// The zone where the cluster is located; letters and digits only.
    #[arg(long, default_value = "default")]
    zone: String,

    /// The region where the cluster is located; letters and digits only.
    #[arg(long, default_value = "default")]
    region: String,

    /// The address the API server listens on (server mode).
    #[arg(long, default_value = "0.0.0.0:3000")]
    api_server_listen_address: SocketAddr,

    /// The address clients use to reach the API server (client mode).
    #[arg(long, default_value = "")]
    api_server_address: String,

    /// The key file for the API server/client.
    #[arg(long, default_value = "")]
    tls_key_file: PathBuf,

    /// The cert file for the API server/client.
    #[arg(long, default_value = "")]
    tls_cert_file: PathBuf,

    /// The CA cert file for the API server/client.
    #[arg(long, default_value = "")]
    tls_ca_cert_file: PathBuf,

    /// Expiration time after a cluster stops heart-beating.
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    cluster_expire_duration: Duration,

    /// The interval between service import cycles.
    #[arg(long, default_value = "1m", value_parser = humantime::parse_duration)]
    service_import_interval: Duration,

    /// Timeout for hub requests.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,

    /// Whether importing may create missing namespaces.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    allow_create_namespace: bool,

    /// The address health probes listen on.
    #[arg(long, default_value = "0.0.0.0:3001")]
    health_probe_listen_address: SocketAddr,

    /// Log level filter.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn validate(args: &Args) -> Result<(), Error> {
    if args.mode != MODE_SERVER && args.mode != MODE_CLIENT {
        return Err(Error::Config(
            "unsupported mode, only server or client is allowed".to_string(),
        ));
    }

    if !is_valid_cluster_name(&args.cluster) {
        return Err(Error::Config(format!("invalid cluster name: {}", args.cluster)));
    }

    if !is_valid_zone_name(&args.zone) {
        return Err(Error::Config(format!("invalid zone name: {}", args.zone)));
    }

    if !is_valid_zone_name(&args.region) {
        return Err(Error::Config(format!("invalid region name: {}", args.region)));
    }

    for (flag, path) in [
        ("tls-key-file", &args.tls_key_file),
        ("tls-cert-file", &args.tls_cert_file),
        ("tls-ca-cert-file", &args.tls_ca_cert_file),
    ] {
        if !file_exists(path) {
            return Err(Error::Config(format!("{flag} does not exist: {}", path.display())));
        }
    }

    if args.mode == MODE_CLIENT && args.api_server_address.is_empty() {
        return Err(Error::Config(
            "api-server-address is required in client mode".to_string(),
        ));
    }

    Ok(())
}

fn file_exists(path: &Path) -> bool {
    path.is_file()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    validate(&args)?;

    telemetry::init(&TelemetryConfig {
        log_level: args.log_level.clone(),
        prometheus_addr: None,
    })
    .map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        mode = %args.mode,
        cluster = %args.cluster,
        zone = %args.zone,
        region = %args.region,
        "starting service-hub"
    );

    let cancel = CancellationToken::new();
    let store = GlobalServiceStore::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if args.mode == MODE_SERVER {
        let manager = Arc::new(GlobalServiceManager::new(
            store.clone(),
            args.allow_create_namespace,
        ));
        let clusters = Arc::new(ClusterStore::new());
        cluster::bootstrap_from_store(
            &clusters,
            &store,
            &args.cluster,
            args.cluster_expire_duration,
        );

        let server_tls = tls::server_config(
            &args.tls_cert_file,
            &args.tls_key_file,
            &args.tls_ca_cert_file,
        )?;
        let listener = std::net::TcpListener::bind(args.api_server_listen_address)?;
        let router = ApiServer::new(
            store.clone(),
            manager.clone(),
            clusters.clone(),
            args.cluster_expire_duration,
        )
        .router();

        let serve_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api_server::serve(listener, server_tls, router, serve_cancel).await {
                error!(error = %e, "hub API server failed");
            }
        }));

        let cleaner = ClusterCleaner::new(clusters, manager, args.cluster_expire_duration);
        tasks.push(tokio::spawn(cleaner.run(cancel.clone())));
    } else {
        let client_tls = tls::client_tls(
            &args.tls_cert_file,
            &args.tls_key_file,
            &args.tls_ca_cert_file,
        )?;
        let client = Arc::new(ApiClient::new(
            &args.api_server_address,
            &args.cluster,
            client_tls,
            args.request_timeout,
        )?);

        // Liveness is sustained by the import cycle's traffic afterwards.
        if let Err(e) = client.heartbeat().await {
            error!(error = %e, "failed to send initial heartbeat");
        }

        let importer = GlobalServiceImporter::new(
            client,
            store.clone(),
            args.service_import_interval,
            args.allow_create_namespace,
        );
        tasks.push(tokio::spawn(importer.run(cancel.clone())));
    }

    let health = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));
    let health_listener = tokio::net::TcpListener::bind(args.health_probe_listen_address).await?;
    info!(addr = %args.health_probe_listen_address, "health probe listening");
    let health_cancel = cancel.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health)
            .with_graceful_shutdown(async move { health_cancel.cancelled().await })
            .await
        {
            error!(error = %e, "health probe server failed");
        }
    }));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    for task in tasks {
        let _ = task.await;
    }

    info!("service-hub shutdown complete");
    Ok(())
}
