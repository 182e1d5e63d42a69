//! Trusted timestamping of archive artifacts (RFC 3161).

pub mod asn1;
mod client;
mod error;
mod manager;

pub use client::{TspClient, TspResponse, CONTENT_TYPE_QUERY, CONTENT_TYPE_REPLY, NONCE_LENGTH};
pub use error::TspError;
pub use manager::{TspData, TspManager};
