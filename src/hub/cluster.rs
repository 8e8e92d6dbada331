//! Registry of peer clusters and their contributed service keys.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::store::GlobalServiceStore;
use crate::types::ServiceKey;

/// One peer cluster: when it was last heard from and which service keys it
/// has contributed. Created lazily by [`ClusterStore::new_cluster`].
#[derive(Debug)]
pub struct Cluster {
    name: String,
    state: RwLock<ClusterState>,
}

#[derive(Debug, Default)]
struct ClusterState {
    /// `None` means never seen; such clusters never expire.
    expire_at: Option<Instant>,
    service_keys: HashSet<ServiceKey>,
}

impl Cluster {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(ClusterState::default()),
        }
    }

    /// The cluster's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When this cluster's contributions expire; `None` for never-seen.
    pub fn expire_time(&self) -> Option<Instant> {
        self.state.read().expire_at
    }

    /// Advance the expire time; called on every inbound request.
    pub fn set_expire_time(&self, at: Instant) {
        self.state.write().expire_at = Some(at);
    }

    /// Whether the expire time has passed. Never-seen clusters report false.
    pub fn is_expired(&self) -> bool {
        matches!(self.state.read().expire_at, Some(at) if at <= Instant::now())
    }

    /// Record a service key contributed by this cluster.
    pub fn add_service_key(&self, key: ServiceKey) {
        self.state.write().service_keys.insert(key);
    }

    /// Forget a contributed service key.
    pub fn remove_service_key(&self, key: &ServiceKey) {
        self.state.write().service_keys.remove(key);
    }

    /// Snapshot of the contributed service keys.
    pub fn service_keys(&self) -> Vec<ServiceKey> {
        self.state.read().service_keys.iter().cloned().collect()
    }

    /// Number of contributed service keys.
    pub fn service_key_count(&self) -> usize {
        self.state.read().service_keys.len()
    }
}

/// Thread-safe registry of peer clusters, owned by the hub server.
#[derive(Debug, Default)]
pub struct ClusterStore {
    clusters: RwLock<HashMap<String, Arc<Cluster>>>,
}

impl ClusterStore {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or lazily create the named cluster.
    pub fn new_cluster(&self, name: &str) -> Arc<Cluster> {
        let mut clusters = self.clusters.write();
        clusters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Cluster::new(name)))
            .clone()
    }

    /// Fetch the named cluster, if known.
    pub fn get(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters.read().get(name).cloned()
    }

    /// Drop the named cluster from the registry.
    pub fn remove(&self, name: &str) {
        self.clusters.write().remove(name);
    }

    /// Clusters whose expire time lies in the past.
    pub fn expired_clusters(&self) -> Vec<Arc<Cluster>> {
        self.clusters
            .read()
            .values()
            .filter(|cluster| cluster.is_expired())
            .cloned()
            .collect()
    }
}

/// Rebuild the registry from an existing catalog after a server restart:
/// every peer cluster found in stored endpoints gets a fresh expire time
/// and its service keys recorded. Endpoints owned by the local cluster are
/// skipped; the local hub does not heartbeat to itself.
pub fn bootstrap_from_store(
    clusters: &ClusterStore,
    store: &GlobalServiceStore,
    local_cluster: &str,
    expire_after: Duration,
) {
    let deadline = Instant::now() + expire_after;

    for service in store.list() {
        let key = service.key();
        for endpoint in &service.spec.endpoints {
            if endpoint.cluster.is_empty() || endpoint.cluster == local_cluster {
                continue;
            }

            let cluster = clusters.new_cluster(&endpoint.cluster);
            if cluster.expire_time().is_none() {
                cluster.set_expire_time(deadline);
            }
            cluster.add_service_key(key.clone());
            debug!(cluster = %endpoint.cluster, key = %key, "recorded cluster contribution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Endpoint, GlobalService, GlobalServiceSpec, ObjectMeta};

    #[test]
    fn test_new_cluster_is_idempotent() {
        let store = ClusterStore::new();

        let first = store.new_cluster("beijing");
        first.add_service_key(ServiceKey::new("default", "nginx"));

        let second = store.new_cluster("beijing");
        assert_eq!(second.service_key_count(), 1);
    }

    #[test]
    fn test_never_seen_cluster_does_not_expire() {
        let store = ClusterStore::new();
        let cluster = store.new_cluster("beijing");

        assert!(cluster.expire_time().is_none());
        assert!(!cluster.is_expired());
        assert!(store.expired_clusters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration() {
        let store = ClusterStore::new();
        let cluster = store.new_cluster("beijing");

        cluster.set_expire_time(Instant::now() + Duration::from_secs(5));
        assert!(!cluster.is_expired());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cluster.is_expired());
        assert_eq!(store.expired_clusters().len(), 1);

        // A late heartbeat revives the cluster.
        cluster.set_expire_time(Instant::now() + Duration::from_secs(5));
        assert!(!cluster.is_expired());
    }

    #[test]
    fn test_service_key_bookkeeping() {
        let cluster = Cluster::new("beijing");
        let key = ServiceKey::new("default", "nginx");

        cluster.add_service_key(key.clone());
        cluster.add_service_key(key.clone());
        assert_eq!(cluster.service_keys(), vec![key.clone()]);

        cluster.remove_service_key(&key);
        assert!(cluster.service_keys().is_empty());
    }

    #[test]
    fn test_remove_cluster() {
        let store = ClusterStore::new();
        store.new_cluster("beijing");
        store.remove("beijing");
        assert!(store.get("beijing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_from_store() {
        let services = GlobalServiceStore::new();
        services
            .upsert(GlobalService {
                metadata: ObjectMeta {
                    name: "nginx".to_string(),
                    namespace: "default".to_string(),
                    ..Default::default()
                },
                spec: GlobalServiceSpec {
                    endpoints: vec![
                        Endpoint {
                            addresses: vec!["10.0.0.1".parse().unwrap()],
                            cluster: "beijing".to_string(),
                            ..Default::default()
                        },
                        Endpoint {
                            addresses: vec!["10.0.0.2".parse().unwrap()],
                            cluster: "shanghai".to_string(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
            })
            .unwrap();

        let clusters = ClusterStore::new();
        bootstrap_from_store(&clusters, &services, "beijing", Duration::from_secs(300));

        // The local cluster is not tracked.
        assert!(clusters.get("beijing").is_none());

        let shanghai = clusters.get("shanghai").unwrap();
        assert!(shanghai.expire_time().is_some());
        assert_eq!(shanghai.service_keys(), vec![ServiceKey::new("default", "nginx")]);
    }
}
