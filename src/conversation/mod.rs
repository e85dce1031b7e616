// Conversation state and prompt assembly

pub mod memory;


use serde::{Deserialize, Serialize};
use std::fmt;

use crate::records::Sentence;

pub use memory::{DEFAULT_HISTORY_WINDOW, Exchange, SessionMemory};

/// Reply the assistant is told to give instead of guessing
pub const UNKNOWN_ISSUE_REPLY: &str =
    "This seems to be an unknown issue, please report it to the project manager.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (role, content) entry of a prompt or a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

pub type ConversationTurn = PromptMessage;

impl PromptMessage {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Fixed system instructions sent at the head of every chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    instructions: Vec<String>,
}

impl PromptTemplate {
    #[inline]
    pub fn new(instructions: Vec<String>) -> Self {
        Self { instructions }
    }

    /// The support-assistant instructions for a ticket-backed product.
    #[inline]
    pub fn support_assistant(product_name: &str) -> Self {
        Self::new(vec![
            format!(
                "You are a support assistant that provides end-user support for a mobile app project called \"{}\". \
                 Your role is to help answer user questions about the functionality of the app as well as to help them \
                 complete common tasks in the app as well as troubleshoot known issues.",
                product_name
            ),
            "You are provided as context a set of JIRA tickets that might be relevant to the user's question. \
             JIRA tickets where the issue type is Task or Story describe the intended behavior of the app. \
             JIRA tickets that have an issue type of Bug are known defects in the app."
                .to_string(),
            "Tip: JIRA tickets that have a Status of Done should already be present in the app. \
             For JIRA tickets that are Bugs and are not Done, they may also contain steps to work around the issue."
                .to_string(),
            format!(
                "Tip: If you don't know the answer, you can reply with '{}'. Don't try to make up an answer.",
                UNKNOWN_ISSUE_REPLY
            ),
        ])
    }

    #[inline]
    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }
}

/// Join retrieved sentences into the body of the context message.
#[inline]
pub fn render_context(sentences: &[Sentence]) -> String {
    sentences
        .iter()
        .map(Sentence::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the ordered prompt for one turn.
///
/// Order is always: fixed instructions, one context message (present even
/// when `context` is empty), the history as alternating user/assistant
/// turns, then the new user message.
#[inline]
pub fn assemble(
    template: &PromptTemplate,
    context: &str,
    history: &[Exchange],
    user_message: &str,
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(template.instructions.len() + history.len() * 2 + 2);

    messages.extend(
        template
            .instructions
            .iter()
            .map(|instruction| PromptMessage::system(instruction.as_str())),
    );
    messages.push(PromptMessage::system(context));
    for exchange in history {
        messages.extend(exchange.turns());
    }
    messages.push(PromptMessage::user(user_message));

    messages
}
