mod completion;
mod service;

pub use crate::error::SessionServiceError;
pub use completion::{CompletionOutcome, CompletionRequest, CompletionWarning};
pub use service::SessionService;
