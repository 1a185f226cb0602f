//! Data transfer objects for the application layer.

mod retrieval_options;
mod retrieve_result;

pub use retrieval_options::{OptionItem, RetrievalOptions, Transition};
pub use retrieve_result::{RetrieveImageResult, RetrieveResult};
