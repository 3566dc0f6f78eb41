//! In-process transport built on `reqwest`.

use async_trait::async_trait;
use tracing::debug;

use super::error::BackendError;
use super::trait_def::Transport;
use super::types::BackendRequest;
use super::wire::{self, Endpoints};

/// Sends requests over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom base URLs (mock servers, proxies).
    pub fn with_endpoints(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, req: &BackendRequest<'_>) -> Result<String, BackendError> {
        let backend = req.backend;
        let wire = wire::build_request(self.endpoints.base_url(backend), req);

        let mut builder = self.client.post(&wire.url).body(wire.body.to_string());
        for (name, value) in &wire.headers {
            builder = builder.header(name, value);
        }

        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(req.options.timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                // Google carries the key in the query string.
                return Err(BackendError::Transport {
                    backend,
                    message: e.without_url().to_string(),
                });
            }
            Err(_) => {
                return Err(BackendError::Timeout {
                    backend,
                    timeout: req.options.timeout,
                });
            }
        };

        debug!(%backend, status, bytes = body.len(), "backend responded");
        wire::decode_response(backend, status, &body)
    }
}
