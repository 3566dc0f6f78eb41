//! Uniform call surface over the registered transports.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::error::BackendError;
use super::registry::TransportRegistry;
use super::types::{BackendId, BackendRequest, CallOptions, ConversationTurn};

/// One call in, one reply out, no retries.
#[derive(Debug, Clone)]
pub struct BackendAdapter {
    registry: Arc<TransportRegistry>,
    options: CallOptions,
}

impl BackendAdapter {
    /// An adapter over `registry` with [`CallOptions::default`].
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self {
            registry,
            options: CallOptions::default(),
        }
    }

    /// Replace the options used by [`Self::call`].
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// The registry calls are dispatched through.
    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Default per-call limits.
    pub fn options(&self) -> CallOptions {
        self.options
    }

    /// Issue one request to `backend` with the adapter's default options.
    pub async fn call(
        &self,
        backend: BackendId,
        credential: &str,
        model: &str,
        system_prompt: &str,
        conversation: &[ConversationTurn],
    ) -> Result<String, BackendError> {
        self.call_with(
            backend,
            credential,
            model,
            system_prompt,
            conversation,
            self.options,
        )
        .await
    }

    /// Issue one request with explicit `options`.
    ///
    /// Fails with [`BackendError::Unregistered`] before any I/O when
    /// `backend` has no transport.
    pub async fn call_with(
        &self,
        backend: BackendId,
        credential: &str,
        model: &str,
        system_prompt: &str,
        conversation: &[ConversationTurn],
        options: CallOptions,
    ) -> Result<String, BackendError> {
        let transport = self
            .registry
            .get(backend)
            .ok_or(BackendError::Unregistered(backend))?;

        let req = BackendRequest {
            backend,
            credential,
            model,
            system_prompt,
            conversation,
            options,
        };

        let started = Instant::now();
        let result = transport.send(&req).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => debug!(
                %backend,
                model,
                transport = transport.name(),
                elapsed_ms,
                chars = text.chars().count(),
                "backend call succeeded"
            ),
            Err(e) => warn!(
                %backend,
                model,
                transport = transport.name(),
                elapsed_ms,
                status = e.status(),
                error = %e,
                "backend call failed"
            ),
        }
        result
    }
}
