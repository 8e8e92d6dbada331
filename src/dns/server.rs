//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::store::GlobalServiceStore;

use super::authority::FabDnsAuthority;
use super::setup::FabDnsSettings;

/// TCP request timeout passed to the hickory server.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval for emitting store metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically emit store metrics.
async fn metrics_loop(store: GlobalServiceStore, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.emit_metrics();
                debug!(services = store.len(), "emitted store metrics");
            }
            _ = cancel.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Authoritative DNS server answering global-service queries.
pub struct DnsServer {
    listen_addr: SocketAddr,
    settings: Arc<FabDnsSettings>,
    store: GlobalServiceStore,
}

impl DnsServer {
    /// Create a new DNS server serving `settings.zones` out of `store`.
    pub fn new(listen_addr: SocketAddr, settings: FabDnsSettings, store: GlobalServiceStore) -> Self {
        Self {
            listen_addr,
            settings: Arc::new(settings),
            store,
        }
    }

    /// Get a handle to the global service store the server reads from.
    pub fn store(&self) -> &GlobalServiceStore {
        &self.store
    }

    /// Run the DNS server until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), Error> {
        info!(
            listen_addr = %self.listen_addr,
            cluster = %self.settings.cluster.name,
            "starting fabdns server"
        );

        let mut catalog = Catalog::new();
        for zone in &self.settings.zones {
            let authority =
                FabDnsAuthority::new(zone.clone(), self.store.clone(), self.settings.clone());
            let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
            catalog.upsert(authority.origin().clone(), vec![authority]);
            info!(zone = %zone, "serving zone");
        }

        let mut server = ServerFuture::new(catalog);

        let udp_socket = UdpSocket::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.listen_addr).await?;
        info!(addr = %self.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        let metrics_store = self.store.clone();
        let metrics_cancel = cancel.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_store, metrics_cancel).await;
        });
        self.store.emit_metrics();

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        let _ = metrics_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let server = DnsServer::new(
            "127.0.0.1:5353".parse().unwrap(),
            FabDnsSettings::default(),
            GlobalServiceStore::new(),
        );
        assert!(server.store().is_empty());
    }
}
