//! Core type definitions for the UMI stat model.
//!
//! Three level stats exist per NPC (friendliness, faith, corruption) and three
//! for the player (hp, umi level, corruption). Every level is an integer in
//! `[LEVEL_MIN, LEVEL_MAX]`; all writes go through [`clamp_level`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, UmiError};

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of a play session (one per user / save slot).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a fresh random session ID for a guest player.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an NPC (matches the key in the prompt catalogue).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(pub String);

impl NpcId {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NpcId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NpcId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// Lowest value any level stat may hold.
pub const LEVEL_MIN: i32 = 0;
/// Highest value any level stat may hold. Corruption at this value is terminal.
pub const LEVEL_MAX: i32 = 100;

/// Clamp a raw value into `[LEVEL_MIN, LEVEL_MAX]`.
#[must_use]
pub fn clamp_level(value: i64) -> i32 {
    // Lossless: the clamped value always fits in i32.
    #[allow(clippy::cast_possible_truncation)]
    let clamped = value.clamp(i64::from(LEVEL_MIN), i64::from(LEVEL_MAX)) as i32;
    clamped
}

// ---------------------------------------------------------------------------
// Stat Keys
// ---------------------------------------------------------------------------

/// A named stat, normalised from whatever spelling the writer used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatKey {
    /// NPC friendliness toward the player.
    Friendliness,
    /// NPC faith in the cult / the sea.
    Faith,
    /// Player hit points.
    Hp,
    /// Player "umi level" (depth reached).
    UmiLevel,
    /// Corruption / fish level of the owning actor.
    Corruption,
    /// Anything else; stored verbatim on the NPC.
    Other(String),
}

/// Where a stat lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatBucket {
    /// The per-NPC record of the speaking NPC.
    Npc,
    /// The session-wide player record.
    Global,
}

impl StatKey {
    /// Normalise a raw stat name.
    ///
    /// Known names are matched case-insensitively with underscores ignored
    /// (`Friendly`, `Umi_Level`, `Fish_Level`, ...). Unknown names keep their
    /// spelling with the first letter lowercased.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        let folded: String = raw
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "friendly" | "friendliness" => Self::Friendliness,
            "faith" => Self::Faith,
            "hp" | "health" => Self::Hp,
            "umilevel" => Self::UmiLevel,
            "fishlevel" | "corruption" | "corruptionlevel" => Self::Corruption,
            _ => Self::Other(lower_first(raw)),
        }
    }

    /// Canonical field name (camelCase, as the front end sees it).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Friendliness => "friendliness",
            Self::Faith => "faith",
            Self::Hp => "hp",
            Self::UmiLevel => "umiLevel",
            Self::Corruption => "fishLevel",
            Self::Other(name) => name,
        }
    }

    /// Bucket a generated stat update is routed to. Unknown keys go to the NPC.
    #[must_use]
    pub fn bucket(&self) -> StatBucket {
        match self {
            Self::Hp | Self::UmiLevel => StatBucket::Global,
            Self::Friendliness | Self::Faith | Self::Corruption | Self::Other(_) => StatBucket::Npc,
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Stat Records
// ---------------------------------------------------------------------------

/// Result of writing a single level stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored (after clamping).
    Applied {
        /// Value before the write.
        previous: i32,
        /// Value after the write.
        current: i32,
    },
    /// Corruption is already at `LEVEL_MAX`; the end state is never changed.
    RefusedTerminal,
}

fn write_corruption(slot: &mut i32, value: i64) -> WriteOutcome {
    if *slot >= LEVEL_MAX {
        return WriteOutcome::RefusedTerminal;
    }
    write_level(slot, value)
}

fn write_level(slot: &mut i32, value: i64) -> WriteOutcome {
    let previous = *slot;
    *slot = clamp_level(value);
    WriteOutcome::Applied {
        previous,
        current: *slot,
    }
}

/// Per-NPC stat record, scoped to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcStats {
    /// Friendliness toward the player (drives prompt tier).
    pub friendliness: i32,
    /// Faith (drives the stat instruction together with friendliness).
    pub faith: i32,
    /// The NPC's own corruption / fish level (drives masking as speaker).
    #[serde(rename = "fishLevel")]
    pub corruption: i32,
    /// Free-form stats written by generated replies under unknown names.
    #[serde(default)]
    pub extra: BTreeMap<String, i32>,
}

impl NpcStats {
    /// Build a record with the given levels, clamped.
    #[must_use]
    pub fn new(friendliness: i64, faith: i64, corruption: i64) -> Self {
        Self {
            friendliness: clamp_level(friendliness),
            faith: clamp_level(faith),
            corruption: clamp_level(corruption),
            extra: BTreeMap::new(),
        }
    }

    /// Write one stat, clamping. Global-only keys land in `extra`.
    pub fn set(&mut self, key: &StatKey, value: i64) -> WriteOutcome {
        match key {
            StatKey::Friendliness => write_level(&mut self.friendliness, value),
            StatKey::Faith => write_level(&mut self.faith, value),
            StatKey::Corruption => write_corruption(&mut self.corruption, value),
            StatKey::Hp | StatKey::UmiLevel | StatKey::Other(_) => {
                let slot = self.extra.entry(key.name().to_string()).or_insert(LEVEL_MIN);
                write_level(slot, value)
            }
        }
    }

    /// Read one stat. Unknown extras read as `None`.
    #[must_use]
    pub fn get(&self, key: &StatKey) -> Option<i32> {
        match key {
            StatKey::Friendliness => Some(self.friendliness),
            StatKey::Faith => Some(self.faith),
            StatKey::Corruption => Some(self.corruption),
            StatKey::Hp | StatKey::UmiLevel | StatKey::Other(_) => self.extra.get(key.name()).copied(),
        }
    }
}

impl Default for NpcStats {
    fn default() -> Self {
        Self::new(50, 50, 0)
    }
}

/// Session-wide player record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    /// Hit points.
    pub hp: i32,
    /// Umi level (how deep the player has gone).
    pub umi_level: i32,
    /// The player's corruption / fish level (drives masking as listener).
    #[serde(rename = "fishLevel")]
    pub corruption: i32,
}

impl PlayerStats {
    /// Build a record with the given levels, clamped.
    #[must_use]
    pub fn new(hp: i64, umi_level: i64, corruption: i64) -> Self {
        Self {
            hp: clamp_level(hp),
            umi_level: clamp_level(umi_level),
            corruption: clamp_level(corruption),
        }
    }

    /// Write one stat, clamping.
    ///
    /// # Errors
    /// Returns [`UmiError::UnknownStat`] for NPC-only keys.
    pub fn set(&mut self, key: &StatKey, value: i64) -> Result<WriteOutcome> {
        match key {
            StatKey::Hp => Ok(write_level(&mut self.hp, value)),
            StatKey::UmiLevel => Ok(write_level(&mut self.umi_level, value)),
            StatKey::Corruption => Ok(write_corruption(&mut self.corruption, value)),
            StatKey::Friendliness | StatKey::Faith | StatKey::Other(_) => Err(UmiError::UnknownStat {
                stat: key.name().to_string(),
                target: "player".to_string(),
            }),
        }
    }

    /// Read one stat.
    #[must_use]
    pub fn get(&self, key: &StatKey) -> Option<i32> {
        match key {
            StatKey::Hp => Some(self.hp),
            StatKey::UmiLevel => Some(self.umi_level),
            StatKey::Corruption => Some(self.corruption),
            StatKey::Friendliness | StatKey::Faith | StatKey::Other(_) => None,
        }
    }

    /// Whether the player has reached Full-Fish (game over).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.corruption >= LEVEL_MAX
    }
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self::new(100, 0, 0)
    }
}

// ---------------------------------------------------------------------------
// Chat History
// ---------------------------------------------------------------------------

/// Who said a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The player.
    Player,
    /// The NPC owning the history.
    Npc,
}

/// One line of the phone chat with an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Who said it.
    pub speaker: Speaker,
    /// Unmasked text (masking is re-applied per render).
    pub text: String,
    /// Wall-clock time of the line.
    pub at: DateTime<Utc>,
}

impl ChatLine {
    /// Create a line stamped with the current time.
    #[must_use]
    pub fn now(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
