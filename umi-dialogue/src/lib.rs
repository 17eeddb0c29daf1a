//! # umi-dialogue — Dialogue Turns for UMI
//!
//! Glues the pure rule engine in `umi-core` to a text generator from
//! `umi-llm`. A [`DialogueEngine`] owns an injected session store, the NPC
//! prompt catalogue, a generator client and a masking RNG. Turns on the same
//! session are serialised; different sessions run independently.
//!
//! ```no_run
//! # async fn demo() -> umi_dialogue::Result<()> {
//! use umi_core::{NpcId, SessionId, UmiConfig};
//! use umi_dialogue::DialogueEngine;
//!
//! let engine = DialogueEngine::from_config(&UmiConfig::default())?;
//! let turn = engine
//!     .send_message(&SessionId::anonymous(), &NpcId::from("innkeeper"), "방 있어요?")
//!     .await?;
//! println!("{}", turn.masked_say);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod telemetry;

pub use engine::{DialogueEngine, DialogueTurn, ItemOutcome};
pub use error::{DialogueError, Result};
pub use telemetry::init_tracing;
