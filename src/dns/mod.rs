//! The authoritative DNS side of fab-dns.
//!
//! Queries flow through [`authority::FabDnsAuthority`]: the name is parsed
//! into a [`parse::RecordRequest`], resolved against the global service
//! store, and answered with the endpoints [`select`] prefers for the local
//! cluster's topology.

pub mod authority;
pub mod parse;
pub mod select;
pub mod server;
pub mod setup;

pub use authority::FabDnsAuthority;
pub use server::DnsServer;
pub use setup::{parse_settings, FabDnsSettings, Fallthrough};
