//! Application services.

mod callback_queue;
mod retrieve_task;
mod retriever;

pub use callback_queue::{CallbackQueue, SerialQueue};
pub use retrieve_task::RetrieveTask;
pub use retriever::{ImageRetriever, ProgressCallback};
