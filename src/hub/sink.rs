//! The export/revoke capability consumed by the exporter and revoker.
//!
//! In server mode the sink is a direct call into the in-process manager;
//! in client mode it is an HTTP round trip to the hub. The exporter and
//! revoker only ever see the trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Error;
use crate::types::GlobalService;

use super::api_client::ApiClient;
use super::manager::GlobalServiceManager;

/// Destination for a cluster's service contributions.
#[async_trait]
pub trait GlobalServiceSink: Send + Sync {
    /// Publish (create or merge) one service contribution.
    async fn export(&self, service: GlobalService) -> Result<(), Error>;

    /// Withdraw `cluster`'s contribution to the named service.
    async fn revoke(&self, cluster: &str, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Server-mode sink: contributions land in the local manager.
pub struct LocalSink {
    manager: Arc<GlobalServiceManager>,
}

impl LocalSink {
    /// Wrap a manager.
    pub fn new(manager: Arc<GlobalServiceManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl GlobalServiceSink for LocalSink {
    async fn export(&self, service: GlobalService) -> Result<(), Error> {
        self.manager.create_or_merge(service)
    }

    async fn revoke(&self, cluster: &str, namespace: &str, name: &str) -> Result<(), Error> {
        self.manager.revoke(cluster, namespace, name)
    }
}

/// Client-mode sink: contributions are uploaded to the hub API server.
pub struct RemoteSink {
    client: Arc<ApiClient>,
}

impl RemoteSink {
    /// Wrap an API client.
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GlobalServiceSink for RemoteSink {
    async fn export(&self, service: GlobalService) -> Result<(), Error> {
        self.client.upload_global_service(&service).await
    }

    async fn revoke(&self, _cluster: &str, namespace: &str, name: &str) -> Result<(), Error> {
        // The server derives the cluster from the client's identity header.
        self.client.delete_global_service(namespace, name).await
    }
}
