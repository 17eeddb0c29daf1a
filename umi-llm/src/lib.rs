//! # umi-llm — Text Generation for UMI NPC Dialogue
//!
//! One interface over several back ends:
//!   - **Ollama** (local, `/api/chat`)
//!   - **OpenAI-compatible API** (`/v1/chat/completions`)
//!   - **Mock** (deterministic canned replies, no network)
//!   - **None** (every call fails, so callers take their fallback path)
//!
//! Every generation has a bounded timeout and a retry budget. Replies follow
//! the `THOUGHT:` / `UPDATED_STATS:` / `SAY:` convention described in
//! [`prompt::RESPONSE_FORMAT`]; parsing them is the caller's job.

pub mod client;
pub mod error;
pub mod mock;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use mock::MockBackend;
pub use types::{ChatRole, ChatTurn, LlmRequest, LlmResponse};
