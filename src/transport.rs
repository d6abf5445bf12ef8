use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Identity, StatusCode};
use tracing::{debug, instrument, warn};

/// Failure to exchange a message with the acquirer
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error: {status}")]
    Status { status: u16, body: String },
}

/// Delivers a signed request document to the acquirer and returns the raw
/// response document.
pub trait Transport: Send + Sync {
    fn post(&self, body: String) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// HTTP POST to the acquirer endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Self::build(endpoint.into(), timeout, None)
    }

    /// Transport authenticating with a TLS client certificate. `pem` holds
    /// the certificate and its unencrypted private key.
    pub fn with_client_identity(
        endpoint: impl Into<String>,
        timeout: Duration,
        pem: &[u8],
    ) -> Result<Self, TransportError> {
        let identity = Identity::from_pem(pem)?;
        Self::build(endpoint.into(), timeout, Some(identity))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build(
        endpoint: String,
        timeout: Duration,
        identity: Option<Identity>,
    ) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idx-client/", env!("CARGO_PKG_VERSION")));
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }
}

impl Transport for HttpTransport {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn post(&self, body: String) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
            .header("Version", "1.0")
            .header("Encoding", "UTF-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "Acquirer responded");
        if status != StatusCode::OK {
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    warn!(%status, %error, "Failed to read error response body");
                    String::new()
                }
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}
