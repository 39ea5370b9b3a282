//! Shared outbound HTTP client
//!
//! One `reqwest::Client` is built at startup and reused by every service
//! client; reqwest clients are cheap to clone and safe for concurrent use.
//! Timeouts follow the platform contract: 10 s to connect, 180 s to read.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::ExportError;
use crate::types::ApiEnvelope;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(180);

/// Thin wrapper binding a `reqwest::Client` to a protocol prefix.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    protocol: String,
}

impl ServiceClient {
    /// Build the shared client. `tls_verify = false` reproduces the legacy
    /// behavior for environments with internal certificate authorities.
    pub fn new(protocol: &str, tls_verify: bool) -> Result<Self, ExportError> {
        if !tls_verify {
            warn!("outbound TLS certificate verification is DISABLED");
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .danger_accept_invalid_certs(!tls_verify)
            .build()
            .map_err(|e| ExportError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            protocol: protocol.to_string(),
        })
    }

    fn url(&self, host: &str, endpoint: &str) -> String {
        format!("{}{}{}", self.protocol, host, endpoint)
    }

    /// POST a JSON body and decode the platform envelope.
    pub async fn post_envelope<B: Serialize, T: DeserializeOwned>(
        &self,
        host: &str,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>, ExportError> {
        let url = self.url(host, endpoint);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ExportError::Upstream(format!("POST {url} failed: {e}")))?;

        response
            .json::<ApiEnvelope<T>>()
            .await
            .map_err(|e| ExportError::Upstream(format!("POST {url} returned invalid body: {e}")))
    }

    /// GET and decode the platform envelope.
    pub async fn get_envelope<T: DeserializeOwned>(
        &self,
        host: &str,
        endpoint: &str,
    ) -> Result<ApiEnvelope<T>, ExportError> {
        let url = self.url(host, endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExportError::Upstream(format!("GET {url} failed: {e}")))?;

        response
            .json::<ApiEnvelope<T>>()
            .await
            .map_err(|e| ExportError::Upstream(format!("GET {url} returned invalid body: {e}")))
    }

    /// Raw access for callers that are not on the envelope contract
    /// (Firestore REST, OAuth token exchange).
    pub fn raw(&self) -> &reqwest::Client {
        &self.http
    }
}

/// A non-200 envelope or a missing `data` field is a soft miss: the caller
/// gets `None` and the current stream ends without failing the job.
pub fn envelope_data<T>(envelope: ApiEnvelope<T>, what: &str) -> Option<T> {
    if envelope.status != 200 {
        warn!(
            "{} returned status {}: {}",
            what,
            envelope.status,
            envelope.error.unwrap_or(envelope.message)
        );
        return None;
    }
    if envelope.data.is_none() {
        warn!("{} returned an empty data payload", what);
    }
    envelope.data
}
