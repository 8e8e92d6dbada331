//! Revokes contributions to global services that are no longer exported
//! locally.
//!
//! The exporter only revokes keys it remembers exporting, which loses
//! track across a restart: a service deleted while the exporter was down
//! keeps its stale endpoints in the federation. The revoker closes that
//! gap from the other side — it watches the global service catalog and
//! withdraws this cluster's endpoints whenever the local service backing
//! them is gone or unlabelled.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::cluster_api::ClusterApi;
use crate::error::Error;
use crate::store::GlobalServiceStore;
use crate::types::ServiceKey;

use super::sink::GlobalServiceSink;

/// Watches global services and revokes this cluster's stale endpoints.
pub struct LostServiceRevoker {
    cluster_name: String,
    store: GlobalServiceStore,
    api: Arc<dyn ClusterApi>,
    sink: Arc<dyn GlobalServiceSink>,
}

impl LostServiceRevoker {
    /// Create a revoker for the named local cluster.
    pub fn new(
        cluster_name: impl Into<String>,
        store: GlobalServiceStore,
        api: Arc<dyn ClusterApi>,
        sink: Arc<dyn GlobalServiceSink>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            store,
            api,
            sink,
        }
    }

    /// Consume the store's change feed until cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        let mut changes = self.store.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("lost-service revoker shutting down");
                    return;
                }
                received = changes.recv() => match received {
                    Ok(key) => {
                        if let Err(e) = self.reconcile(&key).await {
                            error!(key = %key, error = %e, "failed to reconcile global service");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "change feed lagged, some keys were skipped");
                    }
                    Err(RecvError::Closed) => return,
                },
            }
        }
    }

    /// Check one observed global service against the local catalog.
    pub async fn reconcile(&self, key: &ServiceKey) -> Result<(), Error> {
        let Some(global_service) = self.store.get(key) else {
            debug!(key = %key, "global service is gone, nothing to revoke");
            return Ok(());
        };

        let local_service = self.api.get_service(&key.namespace, &key.name).await?;
        if local_service.as_ref().is_some_and(|svc| svc.is_exported()) {
            return Ok(());
        }

        let has_local_endpoints = global_service
            .spec
            .endpoints
            .iter()
            .any(|ep| ep.cluster == self.cluster_name);
        if !has_local_endpoints {
            return Ok(());
        }

        debug!(key = %key, "service lost its export, revoking this cluster's endpoints");
        self.sink
            .revoke(&self.cluster_name, &key.namespace, &key.name)
            .await
    }
}
