//! Hickory DNS authority backed by the global service store.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::metrics::{self, QueryResult, Timer};
use crate::store::GlobalServiceStore;
use crate::types::ServiceKey;

use super::parse::parse_request;
use super::select::select_endpoints;
use super::setup::FabDnsSettings;

/// Authority answering global-service queries for one root zone.
///
/// The query lifecycle: reject non-address query types, parse the name,
/// look the service up in the store, pick endpoints by locality, render one
/// record per address of the queried family. Declined names are delegated
/// to the next authority when the fallthrough policy covers them.
pub struct FabDnsAuthority {
    origin: LowerName,
    store: GlobalServiceStore,
    settings: Arc<FabDnsSettings>,
}

impl FabDnsAuthority {
    /// Create an authority serving `zone` out of `store`.
    pub fn new(zone: Name, store: GlobalServiceStore, settings: Arc<FabDnsSettings>) -> Self {
        Self {
            origin: zone.into(),
            store,
            settings,
        }
    }

    /// Build the record set for the selected addresses, one A per IPv4
    /// address or one AAAA per IPv6 address in tier iteration order.
    fn build_records(&self, name: Name, rtype: RecordType, addresses: &[IpAddr]) -> RecordSet {
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);

        for address in addresses {
            let rdata = match address {
                IpAddr::V4(v4) => RData::A(A::from(*v4)),
                IpAddr::V6(v6) => RData::AAAA(AAAA::from(*v6)),
            };

            let mut record = Record::from_rdata(name.clone(), self.settings.ttl, rdata);
            record.set_dns_class(DNSClass::IN);
            record_set.insert(record, 0);
        }

        record_set
    }

    /// Answer a declined name: delegate when fallthrough covers it,
    /// otherwise a name error.
    fn no_such_name(
        &self,
        name: &LowerName,
        rtype_str: &str,
        timer: &Timer,
    ) -> LookupControlFlow<LookupRecords> {
        if self.settings.fallthrough.matches(name) {
            debug!(name = %name, "falling through to next authority");
            metrics::record_query(rtype_str, QueryResult::Fallthrough, timer.elapsed());
            return LookupControlFlow::Skip;
        }

        metrics::record_query(rtype_str, QueryResult::NxDomain, timer.elapsed());
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
    }
}

#[async_trait]
impl Authority for FabDnsAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        // Only address lookups are served.
        if rtype != RecordType::A && rtype != RecordType::AAAA {
            trace!(name = %name, rtype = ?rtype, "unsupported query type");
            metrics::record_query(&rtype_str, QueryResult::NotImplemented, timer.elapsed());
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                ResponseCode::NotImp,
            )));
        }

        let request = match parse_request(name, &self.origin) {
            Ok(request) => request,
            Err(_) => {
                debug!(name = %name, "query name has no recognized shape");
                return self.no_such_name(name, &rtype_str, &timer);
            }
        };

        trace!(name = %name, request = %request, "global service lookup");

        let key = ServiceKey::new(&request.namespace, &request.service);
        let Some(service) = self.store.get(&key) else {
            debug!(key = %key, "global service not found");
            return self.no_such_name(name, &rtype_str, &timer);
        };

        let endpoints = match select_endpoints(&service, &request, &self.settings.cluster) {
            Ok(endpoints) => endpoints,
            Err(_) => {
                debug!(key = %key, "request is invalid for this service");
                return self.no_such_name(name, &rtype_str, &timer);
            }
        };
        if endpoints.is_empty() {
            debug!(key = %key, "no endpoint matches the request");
            return self.no_such_name(name, &rtype_str, &timer);
        }

        let addresses: Vec<IpAddr> = endpoints
            .iter()
            .flat_map(|ep| ep.addresses.iter().copied())
            .filter(|addr| match rtype {
                RecordType::A => addr.is_ipv4(),
                _ => addr.is_ipv6(),
            })
            .collect();
        if addresses.is_empty() {
            // Endpoints exist but none carries an address of this family.
            debug!(key = %key, rtype = ?rtype, "no address of the queried family");
            metrics::record_query(&rtype_str, QueryResult::EmptyAnswer, timer.elapsed());
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                ResponseCode::NoError,
            )));
        }

        let record_set = self.build_records(Name::from(name.clone()), rtype, &addresses);
        debug!(key = %key, answers = addresses.len(), "answering query");
        metrics::record_answer_size(&rtype_str, addresses.len());
        metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
        LookupControlFlow::Break(Ok(LookupRecords::new(
            lookup_options,
            Arc::new(record_set),
        )))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
