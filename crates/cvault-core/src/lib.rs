pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod semaphore;
pub mod time;
pub mod types;

pub use error::{CvaultError, CvaultResult};
pub use semaphore::Semaphore;
