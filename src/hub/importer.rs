//! Periodic full-sync of the hub catalog into the local store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Error;
use crate::metrics::{self, ImportResult};
use crate::store::GlobalServiceStore;
use crate::types::{
    GlobalService, ObjectMeta, ServiceKey, APP_SERVICE_HUB, LABEL_CREATED_BY,
    LABEL_ORIGIN_RESOURCE_VERSION,
};

/// Where the importer downloads the catalog from; the API client is the
/// production implementation.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every global service known to the hub.
    async fn global_services(&self) -> Result<Vec<GlobalService>, Error>;
}

/// Reconciles the local store against the hub catalog on a ticker: every
/// downloaded service is created or updated, and every local service
/// absent from the download is deleted.
pub struct GlobalServiceImporter {
    source: Arc<dyn CatalogSource>,
    store: GlobalServiceStore,
    interval: Duration,
    allow_create_namespace: bool,
}

impl GlobalServiceImporter {
    /// Create an importer syncing `store` from `source` every `interval`.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: GlobalServiceStore,
        interval: Duration,
        allow_create_namespace: bool,
    ) -> Self {
        Self {
            source,
            store,
            interval,
            allow_create_namespace,
        }
    }

    /// Run until cancellation. The first import happens immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("importer shutting down");
                    return;
                }
                _ = tick.tick() => self.import_once().await,
            }
        }
    }

    /// One import cycle: download, apply, prune.
    pub async fn import_once(&self) {
        let services = match self.source.global_services().await {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "failed to download global services");
                metrics::record_import_cycle(ImportResult::DownloadFailed);
                return;
            }
        };

        metrics::record_imported_services(services.len());
        let imported_keys: HashSet<ServiceKey> = services.iter().map(|svc| svc.key()).collect();

        for service in services {
            self.apply(service);
        }

        for service in self.store.list() {
            let key = service.key();
            if !imported_keys.contains(&key) {
                debug!(key = %key, "removing service absent from the hub catalog");
                self.store.remove(&key);
            }
        }

        metrics::record_import_cycle(ImportResult::Success);
    }

    /// Create or update one service from its hub-side source. The source's
    /// resource version acts as a change marker: when the stored copy
    /// already carries it, the spec is not rewritten.
    fn apply(&self, source: GlobalService) {
        if self.allow_create_namespace {
            self.store.ensure_namespace(&source.metadata.namespace);
        }

        let key = source.key();
        let existing = self.store.get(&key);

        if let Some(existing) = &existing {
            let origin_version = existing.metadata.labels.get(LABEL_ORIGIN_RESOURCE_VERSION);
            if !source.metadata.resource_version.is_empty()
                && origin_version == Some(&source.metadata.resource_version)
            {
                debug!(key = %key, "service is up to date");
                return;
            }
        }

        let mut service = existing.unwrap_or_else(|| GlobalService {
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                ..Default::default()
            },
            ..Default::default()
        });

        service
            .metadata
            .labels
            .entry(LABEL_CREATED_BY.to_string())
            .or_insert_with(|| APP_SERVICE_HUB.to_string());
        service.metadata.labels.insert(
            LABEL_ORIGIN_RESOURCE_VERSION.to_string(),
            source.metadata.resource_version.clone(),
        );
        service.spec = source.spec;

        if let Err(e) = self.store.upsert(service) {
            error!(key = %key, error = %e, "failed to create or update global service");
        }
    }
}
