//! HTTPS client for the hub API server.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::Error;
use crate::types::GlobalService;

use super::api_server::{HEADER_CLUSTER_NAME, PATH_GLOBAL_SERVICES, PATH_HEARTBEAT};
use super::importer::CatalogSource;
use super::tls::ClientTls;

/// A thin client over the four hub operations. Every request carries the
/// cluster identity header; the TLS identity authenticates it.
pub struct ApiClient {
    base_url: String,
    cluster_name: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Build a client for `api_server_addr` presenting `tls` and naming
    /// itself `cluster_name`.
    pub fn new(
        api_server_addr: &str,
        cluster_name: &str,
        tls: ClientTls,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let base_url = api_server_addr.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("invalid api server address: {e}")))?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .identity(tls.identity)
            .add_root_certificate(tls.ca)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url,
            cluster_name: cluster_name.to_string(),
            http,
        })
    }

    /// `GET /api/heartbeat`: announce liveness.
    pub async fn heartbeat(&self) -> Result<(), Error> {
        let response = self
            .http
            .get(self.url(PATH_HEARTBEAT))
            .header(HEADER_CLUSTER_NAME, &self.cluster_name)
            .send()
            .await?;

        handle_response(response).await?;
        Ok(())
    }

    /// `POST /api/global-services`: publish one contribution.
    pub async fn upload_global_service(&self, service: &GlobalService) -> Result<(), Error> {
        debug!(key = %service.key(), "uploading global service");
        let response = self
            .http
            .post(self.url(PATH_GLOBAL_SERVICES))
            .header(HEADER_CLUSTER_NAME, &self.cluster_name)
            .json(service)
            .send()
            .await?;

        handle_response(response).await?;
        Ok(())
    }

    /// `GET /api/global-services`: fetch the whole catalog.
    pub async fn download_all_global_services(&self) -> Result<Vec<GlobalService>, Error> {
        let response = self
            .http
            .get(self.url(PATH_GLOBAL_SERVICES))
            .header(HEADER_CLUSTER_NAME, &self.cluster_name)
            .send()
            .await?;

        let body = handle_response(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// `DELETE /api/global-services/{namespace}/{name}`: withdraw this
    /// cluster's contribution.
    pub async fn delete_global_service(&self, namespace: &str, name: &str) -> Result<(), Error> {
        debug!(namespace, name, "deleting global service contribution");
        let response = self
            .http
            .delete(format!("{}{PATH_GLOBAL_SERVICES}/{namespace}/{name}", self.base_url))
            .header(HEADER_CLUSTER_NAME, &self.cluster_name)
            .send()
            .await?;

        handle_response(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl CatalogSource for ApiClient {
    async fn global_services(&self) -> Result<Vec<GlobalService>, Error> {
        self.download_all_global_services().await
    }
}

/// Map a response to its body: 4xx/5xx become [`Error::Http`] carrying the
/// server's body text, 204 is success with no body.
async fn handle_response(response: reqwest::Response) -> Result<Vec<u8>, Error> {
    let status = response.status();

    if status.as_u16() >= 400 {
        let message = response.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            message,
        });
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Vec::new());
    }

    Ok(response.bytes().await?.to_vec())
}
