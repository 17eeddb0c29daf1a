//! Core types for generation requests and responses.

use serde::{Deserialize, Serialize};

/// Author of an earlier chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The player.
    User,
    /// The NPC.
    Assistant,
}

/// One earlier line of the conversation, sent for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who said it.
    pub role: ChatRole,
    /// What was said.
    pub content: String,
}

impl ChatTurn {
    /// A player line.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An NPC line.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request for one NPC reply.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (persona, stat instruction, response format).
    pub system: String,
    /// The player's message, framed.
    pub user: String,
    /// Earlier turns, oldest first.
    pub history: Vec<ChatTurn>,
    /// Display name of the speaking NPC (used by the mock back end).
    pub npc_name: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A dialogue request with default sampling.
    #[must_use]
    pub fn dialogue(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            history: Vec::new(),
            npc_name: None,
            max_tokens: 400,
            temperature: 0.8,
            timeout_ms: 5000,
        }
    }

    /// Attach earlier turns.
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// Name the speaking NPC.
    #[must_use]
    pub fn with_npc_name(mut self, name: impl Into<String>) -> Self {
        self.npc_name = Some(name.into());
        self
    }

    /// Set temperature and token limit.
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A generated reply.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model answered (`"mock"` for the mock back end).
    pub model: String,
}
