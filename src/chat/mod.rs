// Chat session
// Drives one support conversation: retrieve, assemble, complete, remember

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, info};

use crate::completion::{ChatCompleter, CompletionRequest};
use crate::conversation::{PromptTemplate, SessionMemory, assemble, render_context};
use crate::retrieval::{DEFAULT_TOP_K, Retriever};
use crate::vector_index::IndexHandle;
use crate::{Result, SupportError};

/// Per-session knobs that do not change between turns
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub top_k: usize,
}

impl Default for ChatSettings {
    #[inline]
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Everything a session needs that can be shared between sessions
#[derive(Clone)]
pub struct ChatEngine {
    pub retriever: Retriever,
    pub completer: Arc<dyn ChatCompleter>,
    pub handle: IndexHandle,
    pub template: PromptTemplate,
    pub settings: ChatSettings,
}

impl ChatEngine {
    /// Start a session with its own empty memory
    #[inline]
    pub fn session(&self, memory: SessionMemory) -> ChatSession {
        ChatSession {
            engine: self.clone(),
            memory,
        }
    }
}

/// One conversation with its own history
pub struct ChatSession {
    engine: ChatEngine,
    memory: SessionMemory,
}

impl ChatSession {
    #[inline]
    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Forget the conversation so far
    #[inline]
    pub fn reset(&mut self) {
        self.memory.clear();
    }

    /// Answer one user message.
    ///
    /// Memory only changes when the whole turn succeeds; a retrieval or
    /// completion failure leaves the session exactly as it was.
    #[inline]
    pub fn predict(&mut self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(SupportError::InvalidInput(
                "Message must not be empty".to_string(),
            ));
        }

        let engine = &self.engine;
        let sentences =
            engine
                .retriever
                .search(&engine.handle, message, engine.settings.top_k)?;
        let context = render_context(&sentences);

        let history = self.memory.history();
        let messages = assemble(&engine.template, &context, &history, message);
        debug!(
            "Prompt has {} messages ({} history exchanges)",
            messages.len(),
            history.len()
        );

        let request = CompletionRequest::new(
            engine.settings.model.as_str(),
            messages,
            engine.settings.temperature,
        );
        let reply = engine
            .completer
            .complete(&request)
            .map_err(|e| SupportError::Completion(format!("{:#}", e)))?;

        self.memory.append(message, reply.as_str());
        info!("Answered turn {}", self.memory.len());
        Ok(reply)
    }
}
