//! The `Transport` trait -- how a request physically reaches a backend.
//!
//! The orchestrator never sees which implementation it is talking to. The
//! trait is object-safe so transports can be stored as `Arc<dyn Transport>`
//! in the [`super::TransportRegistry`].

use async_trait::async_trait;

use super::error::BackendError;
use super::types::BackendRequest;

/// Sends one generation request and returns the normalized reply text.
///
/// Implementations perform exactly one logical request per call and never
/// retry internally. Enforcing `req.options.timeout` is their job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs (e.g. "http", "process").
    fn name(&self) -> &str;

    async fn send(&self, req: &BackendRequest<'_>) -> Result<String, BackendError>;
}

// Compile-time assertion: Transport must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Transport) {}
};
