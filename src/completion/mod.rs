// Chat completion collaborator

use anyhow::Result;
use serde::Serialize;

use crate::conversation::PromptMessage;

/// One chat-completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f32,
}

impl CompletionRequest {
    #[inline]
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
        }
    }
}

/// Anything that can answer a list of role/content messages with text
pub trait ChatCompleter: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Lists the model identifiers a completion backend offers
pub trait ModelCatalog: Send + Sync {
    fn list_models(&self) -> Result<Vec<String>>;
}
