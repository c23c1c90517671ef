//! HTTP surface over the dispatcher (feature-gated).

pub mod http;
mod logging;

pub use http::{GatewayHttpState, MAX_REQUEST_BODY_BYTES, router};
pub use logging::init_tracing;
