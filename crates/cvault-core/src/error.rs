use thiserror::Error;

pub type CvaultResult<T> = Result<T, CvaultError>;

#[derive(Debug, Error)]
pub enum CvaultError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("config error: {0}")]
    Config(String),

    /// A queued semaphore waiter was rejected by `purge()` during teardown.
    #[error("task has been purged")]
    Purged,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
