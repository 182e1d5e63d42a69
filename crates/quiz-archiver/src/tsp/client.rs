//! RFC 3161 Time-Stamp Protocol client.
//!
//! Sends a DER-encoded `TimeStampReq` for a SHA-256 digest and hands back the
//! raw request and reply. The reply is not parsed; verifying it is left to
//! whoever consumes the stored pair.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{info_span, Instrument};

use super::asn1::{self, OID_SHA256};
use super::error::TspError;
use crate::credentials::random_bytes;
use crate::sanitize::redact_url;

pub const CONTENT_TYPE_QUERY: &str = "application/timestamp-query";
pub const CONTENT_TYPE_REPLY: &str = "application/timestamp-reply";

pub const NONCE_LENGTH: usize = 16;

const SHA256_HEX_LENGTH: usize = 64;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw bytes of one timestamping exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TspResponse {
    pub query: Vec<u8>,
    pub reply: Vec<u8>,
}

pub struct TspClient {
    client: Client,
    server_url: String,
}

impl TspClient {
    /// Creates a client for `server_url` with bounded timeouts and TLS
    /// certificate verification.
    pub fn new(server_url: impl Into<String>) -> Result<Self, TspError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TspError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server_url: server_url.into(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Encodes a `TimeStampReq`:
    ///
    /// ```text
    /// TimeStampReq ::= SEQUENCE {
    ///     version        INTEGER { v1(1) },
    ///     messageImprint MessageImprint,
    ///     nonce          INTEGER OPTIONAL,
    ///     certReq        BOOLEAN DEFAULT FALSE }
    /// ```
    ///
    /// `hash` is the hex SHA-256 digest, `nonce` must be 16 bytes. `certReq`
    /// is only written when requested since DER omits default values.
    pub fn build_request(hash: &str, nonce: &[u8], cert_req: bool) -> Result<Vec<u8>, TspError> {
        if hash.len() != SHA256_HEX_LENGTH {
            return Err(TspError::InvalidInput(format!(
                "expected a {} character SHA-256 hex digest, got {} characters",
                SHA256_HEX_LENGTH,
                hash.len()
            )));
        }
        let digest = hex::decode(hash)
            .map_err(|e| TspError::InvalidInput(format!("hash is not valid hex: {}", e)))?;

        if nonce.len() != NONCE_LENGTH {
            return Err(TspError::InvalidInput(format!(
                "expected a {} byte nonce, got {} bytes",
                NONCE_LENGTH,
                nonce.len()
            )));
        }

        let message_imprint = asn1::sequence(vec![
            asn1::sequence(vec![asn1::oid(OID_SHA256), asn1::null()]),
            asn1::octet_string(&digest),
        ]);

        let mut fields = vec![
            asn1::small_integer(1),
            message_imprint,
            asn1::unsigned_integer(nonce),
        ];
        if cert_req {
            fields.push(asn1::boolean(true));
        }

        Ok(asn1::sequence(fields).encode())
    }

    /// Requests a timestamp for `hash` with a fresh random nonce.
    pub async fn sign(&self, hash: &str) -> Result<TspResponse, TspError> {
        let nonce = random_bytes::<NONCE_LENGTH>()?;
        self.sign_with_nonce(hash, &nonce, false).await
    }

    pub async fn sign_with_nonce(
        &self,
        hash: &str,
        nonce: &[u8],
        cert_req: bool,
    ) -> Result<TspResponse, TspError> {
        let query = Self::build_request(hash, nonce, cert_req)?;

        let server = redact_url(&self.server_url);
        let span = info_span!("tsp_sign", server = %server);
        let reply = self.exchange(hash, &query, &server).instrument(span).await?;

        Ok(TspResponse { query, reply })
    }

    async fn exchange(&self, hash: &str, query: &[u8], server: &str) -> Result<Vec<u8>, TspError> {
        log::info!("Requesting timestamp for {} from {}", hash, server);

        let response = self
            .client
            .post(&self.server_url)
            .header(CONTENT_TYPE, CONTENT_TYPE_QUERY)
            .body(query.to_vec())
            .send()
            .await
            .map_err(|e| TspError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TspError::Protocol(format!(
                "server answered with HTTP {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        if !mime.eq_ignore_ascii_case(CONTENT_TYPE_REPLY) {
            return Err(TspError::Protocol(format!(
                "expected content type {}, got '{}'",
                CONTENT_TYPE_REPLY, content_type
            )));
        }

        let reply = response
            .bytes()
            .await
            .map_err(|e| TspError::Transport(format!("Failed to read reply: {}", e)))?
            .to_vec();

        log::debug!("Received {} byte timestamp reply", reply.len());
        Ok(reply)
    }
}
