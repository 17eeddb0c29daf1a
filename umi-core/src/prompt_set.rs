//! Per-NPC dialogue prompt sets and friendliness-tiered selection.
//!
//! An NPC either has one template for every mood, or up to four templates
//! keyed by [`FriendlinessTier`] plus an optional default. Selection never
//! fails: anything missing falls back to [`FALLBACK_TEMPLATE`].
//!
//! Catalogues are TOML:
//!
//! ```toml
//! [npcs.innkeeper]
//! name = "Mrs. Cho"
//! prompts = "You are {npc_name}, ..."
//!
//! [npcs.priest]
//! name = "Father Gil"
//! fish_level = 70
//! [npcs.priest.prompts]
//! bad = "..."
//! perfect = "..."
//! default = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::error::{Result, UmiError};
use crate::tier::FriendlinessTier;
use crate::types::{NpcId, NpcStats};

/// Template used when an NPC or a matching tier entry is missing.
pub const FALLBACK_TEMPLATE: &str = "You are {npc_name}, a villager of a quiet fishing town \
where everyone is slowly turning into fish. You are chatting with a newcomer on their phone. \
Stay in character, keep replies to one or two short sentences, and always answer in Korean.";

const BUILTIN_NPCS: &str = include_str!("../data/npcs.toml");

/// Tier-keyed templates. Any entry may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredPrompts {
    /// Friendliness 0–19.
    #[serde(default, alias = "Bad", alias = "BAD")]
    pub bad: Option<String>,
    /// Friendliness 20–45.
    #[serde(default, alias = "Normal", alias = "NORMAL")]
    pub normal: Option<String>,
    /// Friendliness 46–75.
    #[serde(default, alias = "Good", alias = "GOOD")]
    pub good: Option<String>,
    /// Friendliness 76–100.
    #[serde(default, alias = "Perfect", alias = "PERFECT")]
    pub perfect: Option<String>,
    /// Used when the current tier has no entry.
    #[serde(default, alias = "Default", alias = "DEFAULT")]
    pub default: Option<String>,
}

impl TieredPrompts {
    /// Entry for one tier, if present.
    #[must_use]
    pub fn for_tier(&self, tier: FriendlinessTier) -> Option<&str> {
        match tier {
            FriendlinessTier::Bad => self.bad.as_deref(),
            FriendlinessTier::Normal => self.normal.as_deref(),
            FriendlinessTier::Good => self.good.as_deref(),
            FriendlinessTier::Perfect => self.perfect.as_deref(),
        }
    }

    /// Whether any tier-keyed entry exists.
    #[must_use]
    pub fn has_tier_entries(&self) -> bool {
        self.bad.is_some() || self.normal.is_some() || self.good.is_some() || self.perfect.is_some()
    }
}

/// Dialogue templates for one NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSet {
    /// One template regardless of friendliness.
    Single(String),
    /// Friendliness-tiered templates.
    Tiered(TieredPrompts),
}

/// Select the template for an NPC's prompt set at the given friendliness.
///
/// Order: the tier's entry, then the set's default, then the fallback.
/// A missing set yields the fallback.
#[must_use]
pub fn select_prompt(set: Option<&PromptSet>, friendliness: i32) -> &str {
    match set {
        None => FALLBACK_TEMPLATE,
        Some(PromptSet::Single(template)) => template,
        Some(PromptSet::Tiered(tiered)) if tiered.has_tier_entries() => {
            let tier = FriendlinessTier::from_level(friendliness);
            tiered
                .for_tier(tier)
                .or(tiered.default.as_deref())
                .unwrap_or(FALLBACK_TEMPLATE)
        }
        Some(PromptSet::Tiered(tiered)) => tiered.default.as_deref().unwrap_or(FALLBACK_TEMPLATE),
    }
}

/// Catalogue entry for one NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcProfile {
    /// Display name, substituted for `{npc_name}`.
    pub name: String,
    /// Short description, substituted for `{npc_description}`.
    #[serde(default)]
    pub description: String,
    /// Starting friendliness for a new session.
    #[serde(default)]
    pub friendliness: Option<i64>,
    /// Starting faith for a new session.
    #[serde(default)]
    pub faith: Option<i64>,
    /// Starting corruption for a new session (scenario-authored).
    #[serde(default)]
    pub fish_level: Option<i64>,
    /// Dialogue templates.
    pub prompts: PromptSet,
}

impl NpcProfile {
    /// Stats this NPC starts a session with, filling gaps from `base`.
    #[must_use]
    pub fn initial_stats(&self, base: &NpcStats) -> NpcStats {
        NpcStats::new(
            self.friendliness.unwrap_or(i64::from(base.friendliness)),
            self.faith.unwrap_or(i64::from(base.faith)),
            self.fish_level.unwrap_or(i64::from(base.corruption)),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    npcs: HashMap<String, NpcProfile>,
}

/// All known NPC profiles, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    npcs: HashMap<NpcId, NpcProfile>,
}

impl PromptRegistry {
    /// Registry with the NPCs shipped in `data/npcs.toml`.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_toml(BUILTIN_NPCS).unwrap_or_else(|e| {
            warn!(error = %e, "Built-in NPC catalogue failed to parse; starting empty");
            Self::default()
        })
    }

    /// Parse a TOML catalogue.
    ///
    /// # Errors
    /// Returns [`UmiError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: CatalogueFile =
            toml::from_str(toml_str).map_err(|e| UmiError::Config(e.to_string()))?;
        Ok(Self {
            npcs: file
                .npcs
                .into_iter()
                .map(|(id, profile)| (NpcId(id), profile))
                .collect(),
        })
    }

    /// Load a TOML catalogue from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Add or replace an NPC.
    pub fn insert(&mut self, id: NpcId, profile: NpcProfile) {
        self.npcs.insert(id, profile);
    }

    /// Profile for an NPC, if known.
    #[must_use]
    pub fn profile(&self, id: &NpcId) -> Option<&NpcProfile> {
        self.npcs.get(id)
    }

    /// Template for an NPC at the given friendliness (never fails).
    #[must_use]
    pub fn select(&self, id: &NpcId, friendliness: i32) -> &str {
        select_prompt(self.profile(id).map(|p| &p.prompts), friendliness)
    }

    /// Number of NPCs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }

    /// All NPC ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<NpcId> {
        let mut ids: Vec<NpcId> = self.npcs.keys().cloned().collect();
        ids.sort();
        ids
    }
}
