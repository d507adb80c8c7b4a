use thiserror::Error;

use cvault_api::ApiError;
use cvault_core::CvaultError;

pub type DriveResult<T> = Result<T, DriveError>;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Core(#[from] CvaultError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The account key ring is empty; nothing can be encrypted.
    #[error("no master key available")]
    NoMasterKey,

    /// A link or share operation needs a key that could not be
    /// recovered (for example a link key no ring key unwraps).
    #[error("missing key: {0}")]
    MissingKey(String),
}
