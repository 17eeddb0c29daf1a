//! Tier classification for corruption and friendliness levels.
//!
//! Tiers are never stored — they are recomputed from the level every time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display labels for corruption tiers 0–5, in order.
pub const TIER_LABELS: [&str; 6] = [
    "Normal",
    "Mild Mutation",
    "Moderate Mutation",
    "Severe Mutation",
    "Near-Fish",
    "Full-Fish",
];

/// Bucket a corruption level into a tier index `0..=5`.
///
/// Thresholds are checked highest-first, so out-of-range input resolves to
/// tier 0 (below zero) or tier 5 (above 100).
#[must_use]
pub fn tier_of(level: i32) -> u8 {
    if level >= 100 {
        5
    } else if level >= 81 {
        4
    } else if level >= 61 {
        3
    } else if level >= 41 {
        2
    } else if level >= 21 {
        1
    } else {
        0
    }
}

/// Corruption ("fish level") tier of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CorruptionTier {
    /// 0–20.
    Normal = 0,
    /// 21–40.
    MildMutation = 1,
    /// 41–60.
    ModerateMutation = 2,
    /// 61–80.
    SevereMutation = 3,
    /// 81–99.
    NearFish = 4,
    /// 100. Terminal: the actor is fully transformed (game over for the player).
    FullFish = 5,
}

impl CorruptionTier {
    /// All tiers in ascending order.
    pub const ALL: [Self; 6] = [
        Self::Normal,
        Self::MildMutation,
        Self::ModerateMutation,
        Self::SevereMutation,
        Self::NearFish,
        Self::FullFish,
    ];

    /// Classify a corruption level.
    #[must_use]
    pub fn from_level(level: i32) -> Self {
        Self::ALL[usize::from(tier_of(level))]
    }

    /// Numeric tier `0..=5`.
    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        TIER_LABELS[usize::from(self.index())]
    }

    /// Whether this is the end state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FullFish)
    }
}

impl fmt::Display for CorruptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Friendliness tier, used only to pick a dialogue prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FriendlinessTier {
    /// 0–19.
    Bad,
    /// 20–45.
    Normal,
    /// 46–75.
    Good,
    /// 76–100.
    Perfect,
}

impl FriendlinessTier {
    /// Classify a friendliness level.
    #[must_use]
    pub fn from_level(level: i32) -> Self {
        match level {
            l if l <= 19 => Self::Bad,
            l if l <= 45 => Self::Normal,
            l if l <= 75 => Self::Good,
            _ => Self::Perfect,
        }
    }

    /// Key used in prompt catalogues.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Bad => "bad",
            Self::Normal => "normal",
            Self::Good => "good",
            Self::Perfect => "perfect",
        }
    }
}

impl fmt::Display for FriendlinessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_boundaries() {
        assert_eq!(tier_of(0), 0);
        assert_eq!(tier_of(20), 0);
        assert_eq!(tier_of(21), 1);
        assert_eq!(tier_of(40), 1);
        assert_eq!(tier_of(41), 2);
        assert_eq!(tier_of(60), 2);
        assert_eq!(tier_of(61), 3);
        assert_eq!(tier_of(80), 3);
        assert_eq!(tier_of(81), 4);
        assert_eq!(tier_of(99), 4);
        assert_eq!(tier_of(100), 5);
    }

    #[test]
    fn out_of_range_resolves_to_ends() {
        assert_eq!(tier_of(-30), 0);
        assert_eq!(tier_of(250), 5);
    }

    #[test]
    fn labels_follow_tiers() {
        assert_eq!(CorruptionTier::from_level(0).label(), "Normal");
        assert_eq!(CorruptionTier::from_level(50).label(), "Moderate Mutation");
        assert_eq!(CorruptionTier::from_level(90).label(), "Near-Fish");
        assert_eq!(CorruptionTier::from_level(100).label(), "Full-Fish");
        assert!(CorruptionTier::from_level(100).is_terminal());
        assert!(!CorruptionTier::from_level(99).is_terminal());
    }

    #[test]
    fn friendliness_thresholds() {
        assert_eq!(FriendlinessTier::from_level(0), FriendlinessTier::Bad);
        assert_eq!(FriendlinessTier::from_level(19), FriendlinessTier::Bad);
        assert_eq!(FriendlinessTier::from_level(20), FriendlinessTier::Normal);
        assert_eq!(FriendlinessTier::from_level(45), FriendlinessTier::Normal);
        assert_eq!(FriendlinessTier::from_level(46), FriendlinessTier::Good);
        assert_eq!(FriendlinessTier::from_level(75), FriendlinessTier::Good);
        assert_eq!(FriendlinessTier::from_level(76), FriendlinessTier::Perfect);
        assert_eq!(FriendlinessTier::from_level(100), FriendlinessTier::Perfect);
    }
}
