//! Model backend adapter: one call signature over every vendor API.
//!
//! ```text
//! BackendAdapter::call(backend, credential, model, system, turns)
//!     |
//!     v
//! TransportRegistry --get(backend)--> Arc<dyn Transport>
//!     |                                   |
//!     |                  HttpTransport (reqwest) | ProcessTransport (curl)
//!     |                                   |
//!     +------ wire::build_request / wire::decode_response
//! ```

pub mod adapter;
pub mod error;
pub mod http;
pub mod process;
pub mod registry;
pub mod trait_def;
pub mod types;
pub mod wire;

pub use adapter::BackendAdapter;
pub use error::BackendError;
pub use http::HttpTransport;
pub use process::ProcessTransport;
pub use registry::TransportRegistry;
pub use trait_def::Transport;
pub use types::{
    BackendId, BackendIdParseError, BackendRequest, CallOptions, ConversationTurn, Credentials,
    Role, mask_key,
};
pub use wire::Endpoints;
