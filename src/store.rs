//! In-memory global service store.
//!
//! The store is the single shared catalog of [`GlobalService`] objects in a
//! process: the DNS authority reads from it, the hub manager and importer
//! write to it. Every write stamps a fresh resource version and publishes
//! the touched key on a change feed, which the lost-service revoker
//! consumes to observe catalog churn.
//!
//! Services live inside namespaces; writing into a namespace that does not
//! exist fails, which is how a misbehaving import or upload surfaces as a
//! 500 instead of silently materializing objects.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::metrics;
use crate::types::{GlobalService, ServiceKey};

/// Namespace that always exists.
pub const NAMESPACE_DEFAULT: &str = "default";

/// Capacity of the change feed; a lagging subscriber misses keys but the
/// feed itself never blocks writers.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Errors returned by store mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The target namespace has not been created.
    #[error("namespace {0} not found")]
    NamespaceNotFound(String),
}

/// Thread-safe in-memory catalog of global services.
#[derive(Debug, Clone)]
pub struct GlobalServiceStore {
    inner: Arc<RwLock<StoreInner>>,
    changes: broadcast::Sender<ServiceKey>,
}

#[derive(Debug)]
struct StoreInner {
    namespaces: HashSet<String>,
    services: HashMap<ServiceKey, GlobalService>,
    revision: u64,
}

impl Default for GlobalServiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalServiceStore {
    /// Create an empty store containing only the `default` namespace.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                namespaces: HashSet::from([NAMESPACE_DEFAULT.to_string()]),
                services: HashMap::new(),
                revision: 0,
            })),
            changes,
        }
    }

    /// Fetch a service by key.
    pub fn get(&self, key: &ServiceKey) -> Option<GlobalService> {
        self.inner.read().services.get(key).cloned()
    }

    /// Snapshot of every stored service, in no particular order.
    pub fn list(&self) -> Vec<GlobalService> {
        self.inner.read().services.values().cloned().collect()
    }

    /// Number of stored services.
    pub fn len(&self) -> usize {
        self.inner.read().services.len()
    }

    /// Whether the store holds no services.
    pub fn is_empty(&self) -> bool {
        self.inner.read().services.is_empty()
    }

    /// Insert or replace a service. The namespace must exist. The stored
    /// copy gets a fresh resource version, which is also returned.
    pub fn upsert(&self, mut service: GlobalService) -> Result<String, StoreError> {
        let key = service.key();
        let mut inner = self.inner.write();

        if !inner.namespaces.contains(&key.namespace) {
            return Err(StoreError::NamespaceNotFound(key.namespace.clone()));
        }

        inner.revision += 1;
        let resource_version = inner.revision.to_string();
        service.metadata.resource_version = resource_version.clone();
        inner.services.insert(key.clone(), service);
        drop(inner);

        debug!(key = %key, resource_version, "stored global service");
        let _ = self.changes.send(key);
        Ok(resource_version)
    }

    /// Remove a service. Returns the removed object, if any.
    pub fn remove(&self, key: &ServiceKey) -> Option<GlobalService> {
        let removed = self.inner.write().services.remove(key);
        if removed.is_some() {
            debug!(key = %key, "removed global service");
            let _ = self.changes.send(key.clone());
        }
        removed
    }

    /// Create a namespace if it does not exist yet.
    pub fn ensure_namespace(&self, name: &str) {
        let mut inner = self.inner.write();
        if inner.namespaces.insert(name.to_string()) {
            debug!(namespace = name, "created namespace");
        }
    }

    /// Whether the named namespace exists.
    pub fn has_namespace(&self, name: &str) -> bool {
        self.inner.read().namespaces.contains(name)
    }

    /// Subscribe to the change feed. Every upsert or removal publishes the
    /// touched key; receivers that fall behind see a lag error and should
    /// keep reading.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceKey> {
        self.changes.subscribe()
    }

    /// Emit current state metrics.
    pub fn emit_metrics(&self) {
        let inner = self.inner.read();
        metrics::record_store_counts(inner.services.len(), inner.namespaces.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Endpoint, GlobalServiceSpec, ObjectMeta, ServicePort};

    fn make_service(namespace: &str, name: &str) -> GlobalService {
        GlobalService {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            },
            spec: GlobalServiceSpec {
                ports: vec![ServicePort {
                    port: 80,
                    ..Default::default()
                }],
                endpoints: vec![Endpoint {
                    addresses: vec!["10.0.0.1".parse().unwrap()],
                    cluster: "beijing".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = GlobalServiceStore::new();
        let key = ServiceKey::new("default", "nginx");

        assert!(store.get(&key).is_none());
        store.upsert(make_service("default", "nginx")).unwrap();

        let stored = store.get(&key).unwrap();
        assert_eq!(stored.metadata.name, "nginx");
        assert!(!stored.metadata.resource_version.is_empty());
    }

    #[test]
    fn test_upsert_bumps_resource_version() {
        let store = GlobalServiceStore::new();

        let first = store.upsert(make_service("default", "nginx")).unwrap();
        let second = store.upsert(make_service("default", "nginx")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_upsert_unknown_namespace_fails() {
        let store = GlobalServiceStore::new();

        let err = store.upsert(make_service("ghost", "nginx")).unwrap_err();
        assert_eq!(err, StoreError::NamespaceNotFound("ghost".to_string()));

        store.ensure_namespace("ghost");
        assert!(store.upsert(make_service("ghost", "nginx")).is_ok());
    }

    #[test]
    fn test_remove() {
        let store = GlobalServiceStore::new();
        let key = ServiceKey::new("default", "nginx");

        store.upsert(make_service("default", "nginx")).unwrap();
        assert!(store.remove(&key).is_some());
        assert!(store.get(&key).is_none());
        assert!(store.remove(&key).is_none());
    }

    #[test]
    fn test_list() {
        let store = GlobalServiceStore::new();
        store.upsert(make_service("default", "nginx")).unwrap();
        store.upsert(make_service("default", "redis")).unwrap();

        let mut names: Vec<String> =
            store.list().into_iter().map(|svc| svc.metadata.name).collect();
        names.sort();
        assert_eq!(names, vec!["nginx", "redis"]);
    }

    #[tokio::test]
    async fn test_change_feed_publishes_keys() {
        let store = GlobalServiceStore::new();
        let mut changes = store.subscribe();

        store.upsert(make_service("default", "nginx")).unwrap();
        assert_eq!(changes.recv().await.unwrap(), ServiceKey::new("default", "nginx"));

        store.remove(&ServiceKey::new("default", "nginx"));
        assert_eq!(changes.recv().await.unwrap(), ServiceKey::new("default", "nginx"));
    }
}
