//! Wiring from resolved config to core objects.

use std::sync::Arc;

use tracing::debug;

use parley_core::backend::{
    BackendAdapter, BackendId, HttpTransport, ProcessTransport, Transport, TransportRegistry,
};
use parley_core::negotiation::Negotiator;
use parley_core::profile::ProfileStore;

use crate::config::{ParleyConfig, TransportSettings};

/// One shared transport per kind; each backend is mapped to either.
pub fn build_registry(settings: &TransportSettings) -> TransportRegistry {
    let http: Arc<dyn Transport> = Arc::new(HttpTransport::with_endpoints(settings.endpoints.clone()));
    let process: Arc<dyn Transport> = Arc::new(
        ProcessTransport::with_program(settings.program.as_deref().unwrap_or("curl"))
            .endpoints(settings.endpoints.clone()),
    );

    let mut registry = TransportRegistry::new();
    for backend in BackendId::ALL {
        let transport = if settings.process_backends.contains(&backend) {
            Arc::clone(&process)
        } else {
            Arc::clone(&http)
        };
        registry.register(backend, transport);
    }
    debug!(?registry, "transport registry built");
    registry
}

pub fn adapter(cfg: &ParleyConfig) -> BackendAdapter {
    BackendAdapter::new(Arc::new(build_registry(&cfg.transport))).with_options(cfg.transport.options)
}

pub fn profile_store(cfg: &ParleyConfig) -> ProfileStore {
    match &cfg.profile_dir {
        Some(dir) => ProfileStore::with_dir(dir),
        None => ProfileStore::builtin(),
    }
}

pub fn negotiator(cfg: &ParleyConfig) -> Negotiator {
    Negotiator::new(adapter(cfg), cfg.negotiation.clone())
}
