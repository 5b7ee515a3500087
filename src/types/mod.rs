//! Shared data model: messages, responses, options, and errors

pub mod errors;
pub mod message;
pub mod response;

pub use errors::{ProviderAttempt, Result, RouterError};
pub use message::{Message, Role};
pub use response::{GenerationOptions, ModelResponse, Usage};
