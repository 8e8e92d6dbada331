//! Periodic expiry of clusters that stopped heart-beating.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics;

use super::cluster::ClusterStore;
use super::manager::GlobalServiceManager;

/// Sweeps the cluster registry on a ticker and revokes the contributions
/// of every cluster whose expire time has passed.
pub struct ClusterCleaner {
    clusters: Arc<ClusterStore>,
    manager: Arc<GlobalServiceManager>,
    interval: Duration,
}

impl ClusterCleaner {
    /// Create a cleaner ticking every `interval` (the cluster expire
    /// duration).
    pub fn new(
        clusters: Arc<ClusterStore>,
        manager: Arc<GlobalServiceManager>,
        interval: Duration,
    ) -> Self {
        Self {
            clusters,
            manager,
            interval,
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut tick = tokio::time::interval_at(start, self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("cluster cleaner shutting down");
                    return;
                }
                _ = tick.tick() => self.clean_expired_clusters(),
            }
        }
    }

    /// One sweep over the registry. Expiry is re-checked before every key
    /// so that a heartbeat arriving mid-sweep stops the revocation of that
    /// cluster's remaining services.
    pub fn clean_expired_clusters(&self) {
        for cluster in self.clusters.expired_clusters() {
            info!(cluster = %cluster.name(), "cluster expired, revoking its endpoints");
            metrics::record_cluster_expired();

            for key in cluster.service_keys() {
                if !cluster.is_expired() {
                    debug!(cluster = %cluster.name(), "cluster revived, stopping revocation");
                    break;
                }

                match self.manager.revoke(cluster.name(), &key.namespace, &key.name) {
                    Ok(()) => {
                        cluster.remove_service_key(&key);
                        metrics::record_cleaner_revocation();
                    }
                    Err(e) => {
                        error!(
                            cluster = %cluster.name(),
                            key = %key,
                            error = %e,
                            "failed to revoke global service"
                        );
                    }
                }
            }

            if cluster.is_expired() && cluster.service_key_count() == 0 {
                self.clusters.remove(cluster.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GlobalServiceStore;
    use crate::types::{
        Endpoint, GlobalService, GlobalServiceSpec, ObjectMeta, ServiceKey, ServicePort,
    };
    use tokio::time::Instant;

    fn contribution(cluster: &str, address: &str) -> GlobalService {
        GlobalService {
            metadata: ObjectMeta {
                name: "nginx".to_string(),
                namespace: "default".to_string(),
                cluster_name: cluster.to_string(),
                ..Default::default()
            },
            spec: GlobalServiceSpec {
                ports: vec![ServicePort {
                    port: 80,
                    ..Default::default()
                }],
                endpoints: vec![Endpoint {
                    addresses: vec![address.parse().unwrap()],
                    cluster: cluster.to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    struct Fixture {
        store: GlobalServiceStore,
        clusters: Arc<ClusterStore>,
        cleaner: ClusterCleaner,
    }

    fn fixture() -> Fixture {
        let store = GlobalServiceStore::new();
        let manager = Arc::new(GlobalServiceManager::new(store.clone(), true));
        let clusters = Arc::new(ClusterStore::new());
        let cleaner =
            ClusterCleaner::new(clusters.clone(), manager.clone(), Duration::from_secs(300));

        manager.create_or_merge(contribution("beijing", "192.168.1.1")).unwrap();
        manager.create_or_merge(contribution("shanghai", "192.168.1.2")).unwrap();
        let beijing = clusters.new_cluster("beijing");
        beijing.add_service_key(ServiceKey::new("default", "nginx"));
        let shanghai = clusters.new_cluster("shanghai");
        shanghai.add_service_key(ServiceKey::new("default", "nginx"));

        Fixture {
            store,
            clusters,
            cleaner,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cluster_endpoints_are_revoked() {
        let f = fixture();
        f.clusters
            .get("beijing")
            .unwrap()
            .set_expire_time(Instant::now() + Duration::from_secs(10));
        f.clusters
            .get("shanghai")
            .unwrap()
            .set_expire_time(Instant::now() + Duration::from_secs(1000));

        tokio::time::advance(Duration::from_secs(60)).await;
        f.cleaner.clean_expired_clusters();

        let stored = f.store.get(&ServiceKey::new("default", "nginx")).unwrap();
        assert_eq!(stored.spec.endpoints.len(), 1);
        assert_eq!(stored.spec.endpoints[0].cluster, "shanghai");
        // The fully drained cluster entry is dropped from the registry.
        assert!(f.clusters.get("beijing").is_none());
        assert!(f.clusters.get("shanghai").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_before_sweep_keeps_endpoints() {
        let f = fixture();
        let beijing = f.clusters.get("beijing").unwrap();
        beijing.set_expire_time(Instant::now() + Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(60)).await;
        // A heartbeat lands before the sweep runs.
        beijing.set_expire_time(Instant::now() + Duration::from_secs(300));
        f.cleaner.clean_expired_clusters();

        let stored = f.store.get(&ServiceKey::new("default", "nginx")).unwrap();
        assert_eq!(stored.spec.endpoints.len(), 2);
        assert_eq!(beijing.service_key_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_on_ticker() {
        let f = fixture();
        f.clusters
            .get("beijing")
            .unwrap()
            .set_expire_time(Instant::now() + Duration::from_secs(10));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f.cleaner.run(cancel.clone()));

        // Sleep past the expire time and the first tick; the paused clock
        // auto-advances and fires the cleaner's ticker on the way.
        tokio::time::sleep(Duration::from_secs(301)).await;
        tokio::task::yield_now().await;

        let stored = f.store.get(&ServiceKey::new("default", "nginx")).unwrap();
        assert!(stored.spec.endpoints.iter().all(|ep| ep.cluster != "beijing"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
