use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// System preamble sent ahead of every user turn.
pub const SYSTEM_PREAMBLE: &str = "You are a helpful assistant.";

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,

    /// The conversation to complete.
    pub messages: Vec<ChatMessage>,

    /// Whether the provider should answer with server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Builds the single-turn request used for every utterance: the fixed
    /// system preamble followed by `text` as the only user message.
    pub fn single_turn(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(SYSTEM_PREAMBLE), ChatMessage::user(text)],
            stream: false,
        }
    }

    /// Sets the stream flag.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
