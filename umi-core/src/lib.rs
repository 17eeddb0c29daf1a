//! # UMI Core Library
//!
//! Rule engine behind fish-level NPC dialogue.
//!
//! Every actor (the player and each NPC) carries a **corruption level**
//! ("fish level", 0–100). The engine turns those levels into:
//!
//! - **Tiers** — six fixed bands, Normal through Full-Fish ([`tier`])
//! - **Comprehension masking** — per-token replacement of NPC speech when the
//!   listener sits below the speaker's tier ([`masking`])
//! - **Prompt selection** — friendliness-tiered NPC templates ([`prompt_set`])
//! - **Stat instructions** — a faith × friendliness decision table ([`instruction`])
//! - **Reply post-processing** — THOUGHT / UPDATED_STATS / SAY extraction with
//!   corruption writes discarded ([`response`])
//!
//! Stats live in a [`store::SessionStore`], injected by the caller.
//! All engine functions are synchronous and free of I/O.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod effects;
pub mod error;
pub mod instruction;
pub mod masking;
pub mod metrics;
pub mod persistence;
pub mod prompt_set;
pub mod response;
pub mod store;
pub mod tier;
pub mod types;

pub use config::UmiConfig;
pub use effects::ItemEffect;
pub use error::UmiError;
pub use instruction::{StatInstruction, select_instruction};
pub use masking::{Masker, apply_masking, masking_rate};
pub use metrics::{CounterSnapshot, DialogueCounters};
pub use persistence::SqliteSessionStore;
pub use prompt_set::{NpcProfile, PromptRegistry, PromptSet, select_prompt};
pub use response::{ParsedResponse, RoutedPatch, StatParseError, StatPatch, parse_response};
pub use store::{InMemorySessionStore, SessionState, SessionStore, StatChange, StatTarget};
pub use tier::{CorruptionTier, FriendlinessTier, tier_of};
pub use types::*;
