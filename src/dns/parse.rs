//! Query-name parsing for global-service lookups.
//!
//! Three shapes are recognized under a configured root zone:
//!
//! ```text
//! {service}.{namespace}.svc.{zone}                      ClusterIP
//! {hostname}.{cluster}.{service}.{namespace}.svc.{zone} Headless endpoint
//! {service}.{namespace}.{cluster}.{zone}                ad-hoc ClusterIP
//! ```

use hickory_proto::rr::{LowerName, Name};
use std::fmt;

use crate::error::Error;

/// The sentinel label separating service queries from ad-hoc ones.
/// A cluster named "svc" cannot be addressed ad hoc; don't name one that.
const LABEL_SVC: &str = "svc";

/// Which form a query took, with the form-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Plain `{service}.{namespace}.svc.{zone}` lookup.
    ClusterIp,
    /// `{service}.{namespace}.{cluster}.{zone}`: aimed at one source cluster.
    AdHoc {
        /// The targeted source cluster.
        cluster: String,
    },
    /// `{hostname}.{cluster}.{service}.{namespace}.svc.{zone}`.
    Headless {
        /// Hostname of the backing endpoint.
        hostname: String,
        /// Source cluster of the backing endpoint.
        cluster: String,
    },
}

/// A parsed query, valid for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRequest {
    /// The global service name.
    pub service: String,
    /// The namespace of the global service.
    pub namespace: String,
    /// The query form plus its form-specific fields.
    pub kind: QueryKind,
}

impl RecordRequest {
    /// The targeted cluster, when the query form names one.
    pub fn cluster(&self) -> Option<&str> {
        match &self.kind {
            QueryKind::ClusterIp => None,
            QueryKind::AdHoc { cluster } => Some(cluster),
            QueryKind::Headless { cluster, .. } => Some(cluster),
        }
    }
}

impl fmt::Display for RecordRequest {
    /// The query labels relative to the root zone.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            QueryKind::ClusterIp => {
                write!(f, "{}.{}.{}", self.service, self.namespace, LABEL_SVC)
            }
            QueryKind::AdHoc { cluster } => {
                write!(f, "{}.{}.{}", self.service, self.namespace, cluster)
            }
            QueryKind::Headless { hostname, cluster } => write!(
                f,
                "{}.{}.{}.{}.{}",
                hostname, cluster, self.service, self.namespace, LABEL_SVC
            ),
        }
    }
}

/// Parse a query name known to lie under `origin`.
pub fn parse_request(name: &LowerName, origin: &LowerName) -> Result<RecordRequest, Error> {
    if !origin.zone_of(name) {
        return Err(Error::InvalidQueryName);
    }

    let name = Name::from(name.clone());
    let labels: Vec<String> = name
        .iter()
        .map(|label| String::from_utf8_lossy(label).into_owned())
        .collect();
    let origin_labels = Name::from(origin.clone()).num_labels() as usize;
    let relative = &labels[..labels.len() - origin_labels];

    let request = match relative {
        [service, namespace, svc] if svc == LABEL_SVC => RecordRequest {
            service: service.clone(),
            namespace: namespace.clone(),
            kind: QueryKind::ClusterIp,
        },
        [service, namespace, cluster] => RecordRequest {
            service: service.clone(),
            namespace: namespace.clone(),
            kind: QueryKind::AdHoc {
                cluster: cluster.clone(),
            },
        },
        [hostname, cluster, service, namespace, svc] if svc == LABEL_SVC => RecordRequest {
            service: service.clone(),
            namespace: namespace.clone(),
            kind: QueryKind::Headless {
                hostname: hostname.clone(),
                cluster: cluster.clone(),
            },
        },
        _ => return Err(Error::InvalidQueryName),
    };

    Ok(request)
}
