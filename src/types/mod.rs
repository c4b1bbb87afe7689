// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod chat_completion_response;
pub mod chat_message;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_request::{ChatCompletionRequest, SYSTEM_PREAMBLE};
pub use chat_completion_response::{ChatCompletionResponse, Choice, ResponseMessage};
pub use chat_message::{ChatMessage, ChatRole};
