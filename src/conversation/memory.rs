use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::debug;

use super::PromptMessage;

pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// A completed user/assistant exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    #[inline]
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }

    /// The exchange as a user turn followed by an assistant turn
    #[inline]
    pub fn turns(&self) -> [PromptMessage; 2] {
        [
            PromptMessage::user(self.user.as_str()),
            PromptMessage::assistant(self.assistant.as_str()),
        ]
    }
}

impl<U: Into<String>, A: Into<String>> From<(U, A)> for Exchange {
    #[inline]
    fn from((user, assistant): (U, A)) -> Self {
        Self::new(user, assistant)
    }
}

/// History of one chat session.
///
/// With a window of `n`, only the latest `n` exchanges are kept and the
/// oldest one is evicted first. Without a window history grows for as long
/// as the session lives.
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    exchanges: VecDeque<Exchange>,
    window: Option<NonZeroUsize>,
}

impl SessionMemory {
    #[inline]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_window(window: NonZeroUsize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(window.get()),
            window: Some(window),
        }
    }

    /// Window from a config value, where `0` means unbounded
    #[inline]
    pub fn from_window_setting(window: usize) -> Self {
        NonZeroUsize::new(window).map_or_else(Self::unbounded, Self::with_window)
    }

    #[inline]
    pub fn append(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.exchanges.push_back(Exchange::new(user, assistant));

        if let Some(window) = self.window {
            while self.exchanges.len() > window.get() {
                self.exchanges.pop_front();
                debug!("Evicted oldest exchange, window is {}", window);
            }
        }
    }

    #[inline]
    pub fn history(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    #[inline]
    pub fn window(&self) -> Option<NonZeroUsize> {
        self.window
    }

    #[inline]
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}
