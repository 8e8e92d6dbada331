//! Core data model: global services, endpoints and related identifiers.
//!
//! A `GlobalService` aggregates the endpoints contributed by every cluster
//! that exports a service under the same (namespace, name) key. The JSON
//! encoding follows the hub wire format: a `metadata` object plus a `spec`
//! carrying type, ports and endpoints in camelCase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Label marking a local service for federation-wide export.
pub const LABEL_GLOBAL_SERVICE: &str = "fabedge.io/global-service";

/// Label recording which component created an imported object.
pub const LABEL_CREATED_BY: &str = "fabedge.io/created-by";

/// Label holding the hub-side resource version an import was taken from.
pub const LABEL_ORIGIN_RESOURCE_VERSION: &str = "fabedge.io/origin-resource-version";

/// Label linking an endpoint slice to the service that owns it.
pub const LABEL_SERVICE_NAME: &str = "kubernetes.io/service-name";

/// Value of [`LABEL_CREATED_BY`] for objects written by the service hub.
pub const APP_SERVICE_HUB: &str = "service-hub";

/// Maximum number of addresses a single endpoint may carry.
pub const MAX_ENDPOINT_ADDRESSES: usize = 100;

/// The kind of service backing a global service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    /// One virtual address per cluster; lookups pick the closest cluster.
    #[default]
    ClusterIP,
    /// Every backing instance is individually addressable by hostname.
    Headless,
}

/// IP protocol of a service port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// Transmission Control Protocol.
    #[default]
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Stream Control Transmission Protocol.
    Sctp,
}

/// A port on which a global service is exposed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name; must be unique within a service when several ports exist.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Wire protocol, TCP unless stated otherwise.
    #[serde(default)]
    pub protocol: Protocol,
    /// Application protocol hint (e.g. `http`), free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
    /// The exposed port number.
    #[serde(default)]
    pub port: u16,
}

/// Reference to the workload object backing an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Kind of the referent, e.g. `Pod` or `Service`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Name of the referent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace of the referent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// A single backend of a global service, tagged with the topology of the
/// cluster that contributed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Parsed IP addresses of this endpoint, 1 to 100 entries.
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
    /// Hostname, set only for endpoints of headless services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// The workload behind this endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<ObjectReference>,
    /// Name of the source cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    /// Zone of the source cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
    /// Region of the source cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
}

impl Endpoint {
    /// The IPv4 subset of [`Endpoint::addresses`].
    pub fn ipv4_addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// The IPv6 subset of [`Endpoint::addresses`].
    pub fn ipv6_addresses(&self) -> impl Iterator<Item = Ipv6Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }
}

/// Object metadata carried on the hub wire format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name, a DNS label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Object namespace, a DNS label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Source cluster of an uploaded contribution.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    /// Store revision stamped on every write.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Specification of a global service: its type, ports and endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalServiceSpec {
    /// Service type; last writer wins when clusters disagree.
    #[serde(rename = "type", default)]
    pub service_type: ServiceType,
    /// Exposed ports; last writer wins when clusters disagree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    /// Union of the endpoints contributed by every live cluster.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

/// A federation-wide logical service keyed by (namespace, name).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalService {
    /// Name, namespace and bookkeeping labels.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Type, ports and endpoints.
    #[serde(default)]
    pub spec: GlobalServiceSpec,
}

impl GlobalService {
    /// The (namespace, name) key of this service.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Whether this object is acceptable as an uploaded contribution:
    /// named, namespaced, at least one port and one endpoint, and every
    /// endpoint within the address bounds.
    pub fn is_valid_contribution(&self) -> bool {
        !self.metadata.name.is_empty()
            && !self.metadata.namespace.is_empty()
            && !self.spec.ports.is_empty()
            && !self.spec.endpoints.is_empty()
            && self
                .spec
                .endpoints
                .iter()
                .all(|ep| !ep.addresses.is_empty() && ep.addresses.len() <= MAX_ENDPOINT_ADDRESSES)
    }
}

/// The (namespace, name) identity of a service, global or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    /// Namespace half of the key.
    pub namespace: String,
    /// Name half of the key.
    pub name: String,
}

impl ServiceKey {
    /// Build a key from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of the local cluster: name plus topology labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster name, unique across the federation.
    pub name: String,
    /// Topology zone, finer-grained than region.
    pub zone: String,
    /// Topology region.
    pub region: String,
}

impl ClusterInfo {
    /// Build a cluster identity from its parts.
    pub fn new(name: impl Into<String>, zone: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
            region: region.into(),
        }
    }
}
