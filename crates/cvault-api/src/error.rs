use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Device is offline and the endpoint has no cached response.
    #[error("offline and no cached response available")]
    Offline,

    /// The server no longer recognizes our API key. The caller must
    /// tear the session down; retrying cannot help.
    #[error("session invalidated by server: {0}")]
    SessionInvalid(String),

    /// A definitive server-side rejection (validation error, missing
    /// item, permission denied). Not retryable.
    #[error("server rejected request: {message} ({code})")]
    Server { code: String, message: String },

    /// Network-level failure (DNS, TLS, timeout, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not a well-formed API envelope, or the
    /// payload did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// Every attempt failed and no cached fallback existed.
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}
