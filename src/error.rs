//! Error types for fab-dns.

use thiserror::Error;

use crate::cluster_api::ClusterApiError;
use crate::store::StoreError;

/// Errors that can occur in the DNS server or the service hub.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// HTTP transport error while talking to the hub
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Non-2xx response from the hub API server
    #[error("status code: {status}, message: {message}")]
    Http {
        /// HTTP status code returned by the server.
        status: u16,
        /// Body text returned by the server.
        message: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Global service store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local cluster control-plane failure
    #[error(transparent)]
    ClusterApi(#[from] ClusterApiError),

    /// TLS setup failure
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Query name does not follow any recognized global-service shape
    #[error("invalid query name")]
    InvalidQueryName,

    /// JSON encoding/decoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
