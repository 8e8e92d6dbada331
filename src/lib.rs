//! fab-dns — multi-cluster service discovery.
//!
//! Workloads in any participating cluster resolve a *global service* — a
//! logical service whose endpoints live across several clusters — through
//! ordinary DNS queries, and receive the endpoints topologically closest
//! to them (same cluster, then same zone, then same region, then any).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────── cluster A ──────────────────────────┐
//! │  ┌───────────┐   watch    ┌───────────┐  export/revoke        │
//! │  │ Services/ │──────────▶│ Exporter  │───────────┐           │
//! │  │  Slices   │            └───────────┘            ▼           │
//! │  └───────────┘            ┌───────────┐   ┌──────────────┐    │
//! │                           │ Importer  │──▶│ GlobalService │   │
//! │                           └─────▲─────┘   │    Store      │   │
//! │                                 │          └──────┬───────┘   │
//! │                          HTTPS (mTLS)             │ reads     │
//! └─────────────────────────────────┼─────────────────┼───────────┘
//!                                   │                 ▼
//!                        ┌──────────┴─────┐   ┌──────────────┐
//!                        │ hub API server │   │ DNS authority │◀── UDP/TCP
//!                        │  + registry    │   │  (hickory)    │    :53
//!                        │  + cleaner     │   └──────────────┘
//!                        └────────────────┘
//! ```
//!
//! The hub API server merges the contributions of every cluster into the
//! authoritative catalog; clients periodically download the full catalog
//! so that every cluster's DNS authority answers from the same view. The
//! cleaner expires clusters that stop heart-beating and withdraws their
//! endpoints.
//!
//! ## DNS names
//!
//! Under a configured root zone (default `global.`):
//!
//! ```text
//! {service}.{namespace}.svc.global                      ClusterIP lookup
//! {hostname}.{cluster}.{service}.{namespace}.svc.global headless endpoint
//! {service}.{namespace}.{cluster}.global                ad-hoc, one cluster
//! ```
//!
//! Only A and AAAA queries are answered; everything else is NOTIMP.

#![warn(missing_docs)]

pub mod cluster_api;
pub mod config;
pub mod dns;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types
pub use config::TelemetryConfig;
pub use dns::{DnsServer, FabDnsAuthority, FabDnsSettings};
pub use error::Error;
pub use store::GlobalServiceStore;
pub use types::{ClusterInfo, Endpoint, GlobalService, ServiceKey, ServiceType};
