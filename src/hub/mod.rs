//! The service hub: the cluster-federated control plane.
//!
//! Server mode hosts the API server, the cluster registry and the cleaner;
//! client mode uploads local contributions and imports the aggregated
//! catalog back. The exporter and revoker run in both modes and talk to
//! whichever side they are on through the [`sink::GlobalServiceSink`]
//! capability.

pub mod api_client;
pub mod api_server;
pub mod cleaner;
pub mod cluster;
pub mod exporter;
pub mod importer;
pub mod manager;
pub mod revoker;
pub mod sink;
pub mod tls;

pub use api_client::ApiClient;
pub use api_server::{ApiServer, HEADER_CLUSTER_NAME, PATH_GLOBAL_SERVICES, PATH_HEARTBEAT};
pub use cleaner::ClusterCleaner;
pub use cluster::{Cluster, ClusterStore};
pub use exporter::ServiceExporter;
pub use importer::{CatalogSource, GlobalServiceImporter};
pub use manager::GlobalServiceManager;
pub use revoker::LostServiceRevoker;
pub use sink::{GlobalServiceSink, LocalSink, RemoteSink};
