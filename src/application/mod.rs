//! Application layer with the retrieval coordinator and its DTOs.

/// Data transfer objects.
pub mod dto;
/// Retrieval services.
pub mod services;

pub use dto::{OptionItem, RetrievalOptions, RetrieveImageResult, RetrieveResult, Transition};
pub use services::{CallbackQueue, ImageRetriever, ProgressCallback, RetrieveTask};
