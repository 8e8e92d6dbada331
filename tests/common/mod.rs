//! Shared test infrastructure for DNS integration tests.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{AuthorityObject, Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use fab_dns::dns::{FabDnsAuthority, FabDnsSettings};
use fab_dns::types::{
    Endpoint, GlobalService, GlobalServiceSpec, ObjectMeta, ServicePort, ServiceType,
};
use fab_dns::{ClusterInfo, GlobalServiceStore};

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `Catalog::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` and stored as raw wire-format
/// bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Store builders ---

pub fn endpoint(cluster: &str, zone: &str, region: &str, address: &str) -> Endpoint {
    Endpoint {
        addresses: vec![address.parse().unwrap()],
        cluster: cluster.to_string(),
        zone: zone.to_string(),
        region: region.to_string(),
        ..Default::default()
    }
}

pub fn headless_endpoint(
    hostname: &str,
    cluster: &str,
    zone: &str,
    region: &str,
    address: &str,
) -> Endpoint {
    Endpoint {
        hostname: Some(hostname.to_string()),
        ..endpoint(cluster, zone, region, address)
    }
}

pub fn global_service(
    namespace: &str,
    name: &str,
    service_type: ServiceType,
    endpoints: Vec<Endpoint>,
) -> GlobalService {
    GlobalService {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        },
        spec: GlobalServiceSpec {
            service_type,
            ports: vec![ServicePort {
                name: "web".to_string(),
                port: 80,
                ..Default::default()
            }],
            endpoints,
        },
    }
}

pub fn store_with(services: Vec<GlobalService>) -> GlobalServiceStore {
    let store = GlobalServiceStore::new();
    for service in services {
        store.upsert(service).expect("failed to seed store");
    }
    store
}

// --- Catalog construction ---

/// Plugin settings serving the default root zone for the given local
/// cluster identity.
pub fn settings_for(cluster: &str, zone: &str, region: &str) -> FabDnsSettings {
    FabDnsSettings {
        cluster: ClusterInfo::new(cluster, zone, region),
        ..Default::default()
    }
}

/// Build a Catalog with a FabDnsAuthority per configured zone.
pub fn build_catalog(settings: FabDnsSettings, store: GlobalServiceStore) -> Catalog {
    let settings = Arc::new(settings);
    let mut catalog = Catalog::new();
    for zone in &settings.zones {
        let authority = FabDnsAuthority::new(zone.clone(), store.clone(), settings.clone());
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(authority.origin().clone(), vec![authority]);
    }
    catalog
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from a query.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:53210".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract AAAA addresses from a response.
pub fn extract_aaaa_ips(msg: &Message) -> Vec<Ipv6Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::AAAA(aaaa) => Some(Ipv6Addr::from(*aaaa)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert response is successful with exactly the expected A records.
pub fn assert_a_response(msg: &Message, expected_ips: &[&str]) {
    assert_response_code(msg, ResponseCode::NoError);
    let mut actual = extract_a_ips(msg);
    actual.sort();
    let mut expected: Vec<Ipv4Addr> =
        expected_ips.iter().map(|ip| ip.parse().unwrap()).collect();
    expected.sort();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}

/// TTLs of every answer record.
pub fn answer_ttls(msg: &Message) -> Vec<u32> {
    msg.answers().iter().map(|r| r.ttl()).collect()
}
