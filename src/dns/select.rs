//! Locality-preferred endpoint selection.
//!
//! A plain ClusterIP query walks a strict preference ladder and answers
//! from the first non-empty tier: same cluster, then same zone, then same
//! region, then everything. Headless and ad-hoc queries filter on the
//! fields the query names and never fall back.

use crate::types::{ClusterInfo, Endpoint, GlobalService, ServiceType};

use super::parse::{QueryKind, RecordRequest};

/// Why a selection could not be made at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// A hostname query aimed at a service that is not headless.
    InvalidRequest,
}

/// Choose the endpoints to answer `request` with, in tier order.
///
/// An empty result means the name resolves to nothing and the caller
/// should answer with a name error.
pub fn select_endpoints<'a>(
    service: &'a GlobalService,
    request: &RecordRequest,
    local: &ClusterInfo,
) -> Result<Vec<&'a Endpoint>, SelectionError> {
    let endpoints = &service.spec.endpoints;

    match &request.kind {
        QueryKind::ClusterIp => {
            if service.spec.service_type == ServiceType::Headless {
                // A flat-name query on a headless service answers every endpoint.
                return Ok(endpoints.iter().collect());
            }
            Ok(pick_nearest(endpoints, local))
        }
        QueryKind::Headless { hostname, cluster } => {
            if service.spec.service_type != ServiceType::Headless {
                return Err(SelectionError::InvalidRequest);
            }
            Ok(endpoints
                .iter()
                .filter(|ep| {
                    ep.cluster == *cluster && ep.hostname.as_deref() == Some(hostname.as_str())
                })
                .collect())
        }
        QueryKind::AdHoc { cluster } => {
            Ok(endpoints.iter().filter(|ep| ep.cluster == *cluster).collect())
        }
    }
}

/// The four-tier ladder; short-circuits at the first non-empty tier so a
/// response never mixes endpoints from two tiers.
fn pick_nearest<'a>(endpoints: &'a [Endpoint], local: &ClusterInfo) -> Vec<&'a Endpoint> {
    let same_cluster: Vec<&Endpoint> =
        endpoints.iter().filter(|ep| ep.cluster == local.name).collect();
    if !same_cluster.is_empty() {
        return same_cluster;
    }

    let same_zone: Vec<&Endpoint> =
        endpoints.iter().filter(|ep| ep.zone == local.zone).collect();
    if !same_zone.is_empty() {
        return same_zone;
    }

    let same_region: Vec<&Endpoint> =
        endpoints.iter().filter(|ep| ep.region == local.region).collect();
    if !same_region.is_empty() {
        return same_region;
    }

    endpoints.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GlobalServiceSpec, ObjectMeta};
    use std::net::IpAddr;

    fn endpoint(cluster: &str, zone: &str, region: &str, address: &str) -> Endpoint {
        Endpoint {
            addresses: vec![address.parse().unwrap()],
            cluster: cluster.to_string(),
            zone: zone.to_string(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    fn clusterip_service() -> GlobalService {
        GlobalService {
            metadata: ObjectMeta {
                name: "nginx".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            spec: GlobalServiceSpec {
                service_type: ServiceType::ClusterIP,
                endpoints: vec![
                    endpoint("xicheng", "beijing", "north", "192.168.1.1"),
                    endpoint("minhang", "shanghai", "south", "192.168.1.2"),
                    endpoint("chaoyang", "beijing", "north", "192.168.1.3"),
                    endpoint("shijiazhuang", "hebei", "north", "192.168.1.4"),
                ],
                ..Default::default()
            },
        }
    }

    fn headless_service() -> GlobalService {
        let mut ep = endpoint("minhang", "shanghai", "south", "192.168.1.2");
        ep.hostname = Some("test02".to_string());
        GlobalService {
            metadata: ObjectMeta {
                name: "nginx".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            spec: GlobalServiceSpec {
                service_type: ServiceType::Headless,
                endpoints: vec![ep],
                ..Default::default()
            },
        }
    }

    fn clusterip_request() -> RecordRequest {
        RecordRequest {
            service: "nginx".to_string(),
            namespace: "default".to_string(),
            kind: QueryKind::ClusterIp,
        }
    }

    fn addresses(selected: &[&Endpoint]) -> Vec<IpAddr> {
        selected.iter().flat_map(|ep| ep.addresses.iter().copied()).collect()
    }

    #[test]
    fn test_same_cluster_wins() {
        let service = clusterip_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        assert_eq!(addresses(&selected), vec!["192.168.1.3".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_same_zone_when_no_cluster_match() {
        let service = clusterip_service();
        let local = ClusterInfo::new("haidian", "beijing", "north");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        assert_eq!(
            addresses(&selected),
            vec![
                "192.168.1.1".parse::<IpAddr>().unwrap(),
                "192.168.1.3".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_same_region_when_no_zone_match() {
        let service = clusterip_service();
        let local = ClusterInfo::new("tianjin", "tianjin", "north");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        assert_eq!(
            addresses(&selected),
            vec![
                "192.168.1.1".parse::<IpAddr>().unwrap(),
                "192.168.1.3".parse::<IpAddr>().unwrap(),
                "192.168.1.4".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_all_endpoints_as_fallback() {
        let service = clusterip_service();
        let local = ClusterInfo::new("xian", "shanxi", "west");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_tiers_never_mix() {
        let service = clusterip_service();
        let local = ClusterInfo::new("haidian", "beijing", "north");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        // Zone tier selected; nothing from the region-only endpoint.
        assert!(selected.iter().all(|ep| ep.zone == "beijing"));
    }

    #[test]
    fn test_headless_matches_hostname_and_cluster() {
        let service = headless_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");
        let request = RecordRequest {
            service: "nginx".to_string(),
            namespace: "default".to_string(),
            kind: QueryKind::Headless {
                hostname: "test02".to_string(),
                cluster: "minhang".to_string(),
            },
        };

        let selected = select_endpoints(&service, &request, &local).unwrap();
        assert_eq!(addresses(&selected), vec!["192.168.1.2".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_headless_unknown_hostname_selects_nothing() {
        let service = headless_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");
        let request = RecordRequest {
            service: "nginx".to_string(),
            namespace: "default".to_string(),
            kind: QueryKind::Headless {
                hostname: "test03".to_string(),
                cluster: "minhang".to_string(),
            },
        };

        let selected = select_endpoints(&service, &request, &local).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_hostname_query_on_clusterip_service_is_invalid() {
        let service = clusterip_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");
        let request = RecordRequest {
            service: "nginx".to_string(),
            namespace: "default".to_string(),
            kind: QueryKind::Headless {
                hostname: "test02".to_string(),
                cluster: "minhang".to_string(),
            },
        };

        assert_eq!(
            select_endpoints(&service, &request, &local),
            Err(SelectionError::InvalidRequest)
        );
    }

    #[test]
    fn test_flat_query_on_headless_service_returns_all() {
        let service = headless_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");

        let selected = select_endpoints(&service, &clusterip_request(), &local).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_adhoc_filters_on_cluster_only() {
        let service = clusterip_service();
        let local = ClusterInfo::new("chaoyang", "beijing", "north");
        let request = RecordRequest {
            service: "nginx".to_string(),
            namespace: "default".to_string(),
            kind: QueryKind::AdHoc {
                cluster: "minhang".to_string(),
            },
        };

        let selected = select_endpoints(&service, &request, &local).unwrap();
        assert_eq!(addresses(&selected), vec!["192.168.1.2".parse::<IpAddr>().unwrap()]);

        let missing = RecordRequest {
            kind: QueryKind::AdHoc {
                cluster: "nowhere".to_string(),
            },
            ..request
        };
        assert!(select_endpoints(&service, &missing, &local).unwrap().is_empty());
    }
}
