//! HTTP implementation of [`DeliveryClient`].
//!
//! Posts each batch as JSON to `{endpoint}/batch` with `reqwest`. The
//! request timeout bounds every attempt; any 2xx status is a success and
//! everything else is reported as a [`DeliveryError`] for the retry policy
//! to handle.

use std::time::Duration;

use hookrelay_core::{DeliveryClient, DeliveryError, DeliveryReceipt};
use hookrelay_types::Batch;

/// Longest response body kept in a [`DeliveryError::Rejected`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Delivers batches to a downstream HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDeliveryClient {
    /// Create a client posting to `{endpoint}/batch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/batch", endpoint.trim_end_matches('/')),
            timeout,
        })
    }

    /// Full URL batches are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, e: &reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if e.is_builder() {
            DeliveryError::Encode(e.to_string())
        } else {
            DeliveryError::Transport(e.to_string())
        }
    }
}

impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, batch: &Batch) -> Result<DeliveryReceipt, DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(batch)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(DeliveryReceipt {
            status: status.as_u16(),
        })
    }
}
