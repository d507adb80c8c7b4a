//! cvault-api: the authenticated REST gateway.
//!
//! Every server round-trip in the client funnels through
//! [`gateway::RequestGateway`], which owns the retry policy, the
//! offline/exhaustion cache fallback, checksum and bearer headers, and
//! the session-invalidation hook. The [`transport::Transport`] trait is
//! the seam to the HTTP stack so tests can script responses without a
//! server.

pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod transport;

pub use envelope::ApiEnvelope;
pub use error::{ApiError, ApiResult};
pub use gateway::RequestGateway;
pub use transport::{
    AlwaysOnline, HttpMethod, HttpRequest, HttpResponse, NetworkStatus, ReqwestTransport,
    Transport,
};
