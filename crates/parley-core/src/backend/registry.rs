//! Transport registry -- which [`Transport`] serves each [`BackendId`].
//!
//! Validated once at negotiation start so a backend without a transport
//! fails before any call is issued.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::BackendError;
use super::http::HttpTransport;
use super::trait_def::Transport;
use super::types::BackendId;

#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<BackendId, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that serves every backend through one shared
    /// [`HttpTransport`].
    pub fn http_default() -> Self {
        Self::uniform(Arc::new(HttpTransport::new()))
    }

    /// Serve every backend with the same transport.
    pub fn uniform(transport: Arc<dyn Transport>) -> Self {
        let mut registry = Self::new();
        for backend in BackendId::ALL {
            registry.register(backend, Arc::clone(&transport));
        }
        registry
    }

    /// Register `transport` for `backend`, returning the one it replaced.
    pub fn register(
        &mut self,
        backend: BackendId,
        transport: Arc<dyn Transport>,
    ) -> Option<Arc<dyn Transport>> {
        self.transports.insert(backend, transport)
    }

    /// The transport serving `backend`, if one is registered.
    pub fn get(&self, backend: BackendId) -> Option<&Arc<dyn Transport>> {
        self.transports.get(&backend)
    }

    /// Fail with [`BackendError::Unregistered`] for the first backend in
    /// `required` that has no transport.
    pub fn validate(&self, required: &[BackendId]) -> Result<(), BackendError> {
        match required.iter().find(|b| !self.transports.contains_key(b)) {
            Some(missing) => Err(BackendError::Unregistered(*missing)),
            None => Ok(()),
        }
    }

    /// Registered backends with their transport names, in resolver order.
    pub fn list(&self) -> Vec<(BackendId, &str)> {
        BackendId::ALL
            .into_iter()
            .filter_map(|b| self.transports.get(&b).map(|t| (b, t.name())))
            .collect()
    }

    /// Number of backends with a transport.
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Whether no backend has a transport.
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.list())
            .finish()
    }
}
