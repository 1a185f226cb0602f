//! Domain error types.

mod cache_error;
mod download_error;
mod process_error;
mod retrieve_error;
mod setup_error;

pub use cache_error::{CacheError, CacheResult};
pub use download_error::DownloadError;
pub use process_error::ProcessError;
pub use retrieve_error::RetrieveError;
pub use setup_error::SetupError;
