//! Merge-and-revoke primitives for the global service store.

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::store::GlobalServiceStore;
use crate::types::{GlobalService, GlobalServiceSpec, ObjectMeta, ServiceKey};

/// Serializes every contribution and revocation against the store so that
/// concurrent operations on the same service key are linearizable. One
/// manager-wide lock is deliberately the whole concurrency story here.
pub struct GlobalServiceManager {
    store: GlobalServiceStore,
    allow_create_namespace: bool,
    lock: Mutex<()>,
}

impl GlobalServiceManager {
    /// Create a manager over `store`. When `allow_create_namespace` is set,
    /// contributions into unknown namespaces create them on the fly.
    pub fn new(store: GlobalServiceStore, allow_create_namespace: bool) -> Self {
        Self {
            store,
            allow_create_namespace,
            lock: Mutex::new(()),
        }
    }

    /// Upsert a cluster's contribution under its (namespace, name) key.
    ///
    /// If the service does not exist it is created as uploaded. Otherwise
    /// the source cluster's previous endpoints are dropped, the incoming
    /// ones appended, and type and ports overwritten — last writer wins for
    /// type and ports while endpoints accumulate per source cluster.
    pub fn create_or_merge(&self, external: GlobalService) -> Result<(), Error> {
        let _guard = self.lock.lock();

        if self.allow_create_namespace {
            self.store.ensure_namespace(&external.metadata.namespace);
        }

        let key = external.key();
        let source_cluster = external.metadata.cluster_name.clone();

        match self.store.get(&key) {
            None => {
                let service = GlobalService {
                    metadata: ObjectMeta {
                        name: external.metadata.name,
                        namespace: external.metadata.namespace,
                        ..Default::default()
                    },
                    spec: external.spec,
                };
                self.store.upsert(service)?;
            }
            Some(mut local) => {
                let mut endpoints = local.spec.endpoints;
                endpoints.retain(|ep| ep.cluster != source_cluster);
                endpoints.extend(external.spec.endpoints);

                local.spec = GlobalServiceSpec {
                    service_type: external.spec.service_type,
                    ports: external.spec.ports,
                    endpoints,
                };
                self.store.upsert(local)?;
            }
        }

        debug!(key = %key, cluster = %source_cluster, "merged global service contribution");
        Ok(())
    }

    /// Drop every endpoint `cluster` contributed to the named service.
    /// Deletes the service once no endpoints remain; revoking a service
    /// that does not exist is not an error.
    pub fn revoke(&self, cluster: &str, namespace: &str, name: &str) -> Result<(), Error> {
        let _guard = self.lock.lock();

        let key = ServiceKey::new(namespace, name);
        let Some(mut service) = self.store.get(&key) else {
            return Ok(());
        };

        service.spec.endpoints.retain(|ep| ep.cluster != cluster);

        if service.spec.endpoints.is_empty() {
            self.store.remove(&key);
            debug!(key = %key, cluster, "revoked last endpoints, service deleted");
        } else {
            self.store.upsert(service)?;
            debug!(key = %key, cluster, "revoked endpoints");
        }

        Ok(())
    }
}
