//! The hub API server: heartbeat, upload, download and delete over mTLS.

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::metrics;
use crate::store::GlobalServiceStore;
use crate::types::{GlobalService, ObjectMeta, ServiceKey};

use super::cluster::ClusterStore;
use super::manager::GlobalServiceManager;

/// Header naming the calling cluster; any request carrying it refreshes
/// that cluster's expire time.
pub const HEADER_CLUSTER_NAME: &str = "X-FabEdge-Cluster";

/// Heartbeat path.
pub const PATH_HEARTBEAT: &str = "/api/heartbeat";

/// Global services collection path.
pub const PATH_GLOBAL_SERVICES: &str = "/api/global-services";

/// Grace period for in-flight requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state behind the hub API handlers.
#[derive(Clone)]
pub struct ApiServer {
    store: GlobalServiceStore,
    manager: Arc<GlobalServiceManager>,
    clusters: Arc<ClusterStore>,
    expire_duration: Duration,
}

impl ApiServer {
    /// Assemble the server state.
    pub fn new(
        store: GlobalServiceStore,
        manager: Arc<GlobalServiceManager>,
        clusters: Arc<ClusterStore>,
        expire_duration: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            clusters,
            expire_duration,
        }
    }

    /// Build the router with every handler and the expire-time middleware.
    pub fn router(self) -> Router {
        Router::new()
            .route(PATH_HEARTBEAT, get(heartbeat))
            .route(
                PATH_GLOBAL_SERVICES,
                get(get_all_global_services).post(upload_global_service),
            )
            .route(
                "/api/global-services/:namespace/:name",
                delete(delete_endpoints),
            )
            .layer(middleware::from_fn_with_state(
                self.clone(),
                update_cluster_expire_time,
            ))
            .with_state(self)
    }
}

/// Serve `router` over mutually-authenticated TLS until cancellation.
pub async fn serve(
    listener: std::net::TcpListener,
    tls: Arc<rustls::ServerConfig>,
    router: Router,
    cancel: CancellationToken,
) -> Result<(), Error> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    info!(%addr, "hub API server listening");

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        info!("hub API server shutdown requested");
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(tls))
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    info!("hub API server stopped");
    Ok(())
}

/// Extract the calling cluster from the identity header.
fn cluster_name(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_CLUSTER_NAME)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Stamp the caller's expire time before dispatching the request.
async fn update_cluster_expire_time(
    State(state): State<ApiServer>,
    request: Request,
    next: Next,
) -> Response {
    let caller = cluster_name(request.headers());
    if !caller.is_empty() {
        state
            .clusters
            .new_cluster(&caller)
            .set_expire_time(Instant::now() + state.expire_duration);
    }

    next.run(request).await
}

/// `GET /api/heartbeat`; the identity header is the whole signal.
async fn heartbeat() -> StatusCode {
    metrics::record_hub_request(PATH_HEARTBEAT, StatusCode::NO_CONTENT.as_u16());
    StatusCode::NO_CONTENT
}

/// `GET /api/global-services`: the whole catalog, metadata stripped to
/// name, namespace and resource version.
async fn get_all_global_services(State(state): State<ApiServer>) -> Json<Vec<GlobalService>> {
    let services = state
        .store
        .list()
        .into_iter()
        .map(|mut service| {
            service.metadata = ObjectMeta {
                name: service.metadata.name,
                namespace: service.metadata.namespace,
                resource_version: service.metadata.resource_version,
                ..Default::default()
            };
            service
        })
        .collect();

    metrics::record_hub_request(PATH_GLOBAL_SERVICES, StatusCode::OK.as_u16());
    Json(services)
}

/// `POST /api/global-services`: merge one cluster's contribution.
async fn upload_global_service(
    State(state): State<ApiServer>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut service: GlobalService = match serde_json::from_slice(&body) {
        Ok(service) => service,
        Err(e) => {
            return respond(
                StatusCode::BAD_REQUEST,
                format!("unable to unmarshal request body: {e}"),
            );
        }
    };

    if !service.is_valid_contribution() {
        return respond(StatusCode::BAD_REQUEST, "data is not valid".to_string());
    }

    let caller = cluster_name(&headers);
    if service.metadata.cluster_name.is_empty() {
        service.metadata.cluster_name = caller.clone();
    }
    let key = service.key();

    debug!(key = %key, cluster = %caller, "received global service upload");
    let result = state.manager.create_or_merge(service);

    // The contribution is recorded against the caller even when the merge
    // fails; the cleaner's revocation of an unmerged key is a no-op.
    if !caller.is_empty() {
        state.clusters.new_cluster(&caller).add_service_key(key);
    }

    match result {
        Ok(()) => respond(StatusCode::NO_CONTENT, String::new()),
        Err(e) => {
            warn!(error = %e, "failed to merge uploaded global service");
            respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// `DELETE /api/global-services/{namespace}/{name}`: withdraw the calling
/// cluster's endpoints. Deleting an absent service still succeeds.
async fn delete_endpoints(
    State(state): State<ApiServer>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let caller = cluster_name(&headers);
    debug!(namespace, name, cluster = %caller, "received endpoint delete");

    match state.manager.revoke(&caller, &namespace, &name) {
        Ok(()) => {
            if let Some(cluster) = state.clusters.get(&caller) {
                cluster.remove_service_key(&ServiceKey::new(&namespace, &name));
            }
            respond(StatusCode::NO_CONTENT, String::new())
        }
        Err(e) => {
            warn!(error = %e, "failed to remove endpoints");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to remove endpoints: {e}"),
            )
        }
    }
}

fn respond(status: StatusCode, message: String) -> Response {
    metrics::record_hub_request(PATH_GLOBAL_SERVICES, status.as_u16());
    (status, message).into_response()
}
