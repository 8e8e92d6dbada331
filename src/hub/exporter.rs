//! Exports locally-marked services as global service contributions.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::cluster_api::{AddressType, ClusterApi};
use crate::error::Error;
use crate::types::{
    ClusterInfo, Endpoint, GlobalService, GlobalServiceSpec, ObjectMeta, ServiceKey, ServiceType,
};

use super::sink::GlobalServiceSink;

/// Watches local services and keeps the hub's view of them current.
///
/// Reconciles one service key at a time: an exported ClusterIP service
/// becomes a single-endpoint contribution carrying its virtual IPs, an
/// exported headless service becomes one endpoint per backing workload.
/// A service that disappears or loses the export label has this cluster's
/// contribution revoked, but only if the exporter published it before.
pub struct ServiceExporter {
    cluster: ClusterInfo,
    api: Arc<dyn ClusterApi>,
    sink: Arc<dyn GlobalServiceSink>,
    exported_keys: HashSet<ServiceKey>,
}

impl ServiceExporter {
    /// Create an exporter for the local cluster.
    pub fn new(
        cluster: ClusterInfo,
        api: Arc<dyn ClusterApi>,
        sink: Arc<dyn GlobalServiceSink>,
    ) -> Self {
        Self {
            cluster,
            api,
            sink,
            exported_keys: HashSet::new(),
        }
    }

    /// Process service-key events until the channel closes or the token
    /// fires. Distinct keys may be processed by distinct exporters
    /// concurrently; one exporter is strictly sequential.
    pub async fn run(mut self, mut events: mpsc::Receiver<ServiceKey>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("service exporter shutting down");
                    return;
                }
                maybe_key = events.recv() => {
                    let Some(key) = maybe_key else { return };
                    if let Err(e) = self.reconcile(&key).await {
                        error!(key = %key, error = %e, "failed to reconcile service");
                    }
                }
            }
        }
    }

    /// Bring the hub's view of one service in line with the local one.
    pub async fn reconcile(&mut self, key: &ServiceKey) -> Result<(), Error> {
        let Some(service) = self.api.get_service(&key.namespace, &key.name).await? else {
            debug!(key = %key, "service is gone");
            return self.revoke_if_exported(key).await;
        };

        if !service.is_exported() {
            debug!(key = %key, "service is not marked as a global service");
            return self.revoke_if_exported(key).await;
        }

        let (service_type, endpoints) = if service.headless {
            (ServiceType::Headless, self.headless_endpoints(key).await?)
        } else {
            let endpoint = Endpoint {
                addresses: service.cluster_ips.clone(),
                cluster: self.cluster.name.clone(),
                zone: self.cluster.zone.clone(),
                region: self.cluster.region.clone(),
                ..Default::default()
            };
            (ServiceType::ClusterIP, vec![endpoint])
        };

        let contribution = GlobalService {
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                cluster_name: self.cluster.name.clone(),
                ..Default::default()
            },
            spec: GlobalServiceSpec {
                service_type,
                ports: service.ports.clone(),
                endpoints,
            },
        };

        debug!(key = %key, "exporting global service");
        self.sink.export(contribution).await?;
        self.exported_keys.insert(key.clone());
        Ok(())
    }

    /// Revoke this cluster's contribution when the key was exported before.
    async fn revoke_if_exported(&mut self, key: &ServiceKey) -> Result<(), Error> {
        if !self.exported_keys.contains(key) {
            return Ok(());
        }

        debug!(key = %key, "revoking previously exported service");
        self.sink
            .revoke(&self.cluster.name, &key.namespace, &key.name)
            .await?;
        self.exported_keys.remove(key);
        Ok(())
    }

    /// Gather the endpoints of a headless service from its slices.
    ///
    /// Slices are processed in address-type order so dual-stack merges are
    /// deterministic; endpoints are grouped by targetRef name, the first
    /// slice establishing hostname and targetRef and later slices only
    /// appending addresses. FQDN slices are skipped entirely.
    async fn headless_endpoints(&self, key: &ServiceKey) -> Result<Vec<Endpoint>, Error> {
        let mut slices = self.api.endpoint_slices(&key.namespace, &key.name).await?;
        slices.sort_by_key(|slice| slice.address_type);

        let mut by_target: BTreeMap<String, Endpoint> = BTreeMap::new();
        for slice in &slices {
            if slice.address_type == AddressType::Fqdn {
                continue;
            }

            for slice_endpoint in &slice.endpoints {
                let Some(target_ref) = &slice_endpoint.target_ref else {
                    warn!(slice = %slice.name, "skipping endpoint without a target ref");
                    continue;
                };

                let mut addresses = Vec::with_capacity(slice_endpoint.addresses.len());
                for raw in &slice_endpoint.addresses {
                    match raw.parse::<IpAddr>() {
                        Ok(ip) => addresses.push(ip),
                        Err(_) => {
                            warn!(slice = %slice.name, address = %raw, "skipping non-IP address")
                        }
                    }
                }

                match by_target.entry(target_ref.name.clone()) {
                    Entry::Occupied(mut existing) => {
                        existing.get_mut().addresses.extend(addresses);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(Endpoint {
                            addresses,
                            hostname: slice_endpoint.hostname.clone(),
                            target_ref: Some(target_ref.clone()),
                            cluster: self.cluster.name.clone(),
                            zone: self.cluster.zone.clone(),
                            region: self.cluster.region.clone(),
                        });
                    }
                }
            }
        }

        // BTreeMap iteration keeps the output sorted by targetRef name.
        Ok(by_target.into_values().collect())
    }
}
