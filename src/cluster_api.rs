//! Contract with the local cluster control plane.
//!
//! The control plane that owns Services and EndpointSlices is an external
//! collaborator; this module pins down the slice of it the exporter and
//! revoker need. Integrations implement [`ClusterApi`] against their
//! control plane; tests use an in-memory fake.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;
use thiserror::Error;

use crate::types::{ObjectReference, ServicePort, LABEL_GLOBAL_SERVICE};

/// Error returned by a [`ClusterApi`] implementation.
#[derive(Debug, Error)]
#[error("cluster api error: {message}")]
pub struct ClusterApiError {
    /// Description of the failure.
    pub message: String,
}

/// Address family of an endpoint slice. The ordering is the deterministic
/// merge order used when a workload appears in slices of several families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressType {
    /// Addresses are fully-qualified domain names; never exported.
    #[default]
    Fqdn,
    /// Addresses are IPv4 literals.
    IPv4,
    /// Addresses are IPv6 literals.
    IPv6,
}

/// Kind of a local service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalServiceKind {
    /// A cluster-internal virtual IP service; the only exportable kind.
    #[default]
    ClusterIp,
    /// A service exposed on every node's port.
    NodePort,
    /// A service fronted by an external load balancer.
    LoadBalancer,
    /// An alias for an external DNS name.
    ExternalName,
}

/// A service as exposed by the local control plane.
#[derive(Debug, Clone, Default)]
pub struct LocalService {
    /// Service name.
    pub name: String,
    /// Service namespace.
    pub namespace: String,
    /// Labels, including the export marker when present.
    pub labels: BTreeMap<String, String>,
    /// Kind of the service.
    pub kind: LocalServiceKind,
    /// Whether the service is headless (no virtual IP assigned).
    pub headless: bool,
    /// Assigned virtual IPs; two entries on dual-stack clusters.
    pub cluster_ips: Vec<IpAddr>,
    /// Exposed ports.
    pub ports: Vec<ServicePort>,
}

impl LocalService {
    /// Whether this service is marked for federation-wide export: labelled
    /// `fabedge.io/global-service=true` and of the ClusterIP family.
    pub fn is_exported(&self) -> bool {
        self.labels.get(LABEL_GLOBAL_SERVICE).is_some_and(|v| v == "true")
            && self.kind == LocalServiceKind::ClusterIp
    }
}

/// One endpoint inside an endpoint slice.
#[derive(Debug, Clone, Default)]
pub struct SliceEndpoint {
    /// Raw addresses; IP literals for IPv4/IPv6 slices, names for FQDN.
    pub addresses: Vec<String>,
    /// Endpoint hostname, present for headless backends.
    pub hostname: Option<String>,
    /// The workload backing this endpoint.
    pub target_ref: Option<ObjectReference>,
}

/// A group of endpoints sharing one address family.
#[derive(Debug, Clone, Default)]
pub struct EndpointSlice {
    /// Slice name.
    pub name: String,
    /// Slice namespace.
    pub namespace: String,
    /// Labels, including `kubernetes.io/service-name`.
    pub labels: BTreeMap<String, String>,
    /// Address family of every endpoint in this slice.
    pub address_type: AddressType,
    /// The endpoints themselves.
    pub endpoints: Vec<SliceEndpoint>,
}

/// Read access to the local cluster's services and endpoint slices.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a service by namespace and name. `Ok(None)` when absent.
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LocalService>, ClusterApiError>;

    /// List the endpoint slices backing the named service.
    async fn endpoint_slices(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Vec<EndpointSlice>, ClusterApiError>;
}
