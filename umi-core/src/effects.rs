//! Consumable item effects.
//!
//! Items are deliberate game logic, so unlike generated replies they may move
//! corruption. Deltas are added to the current value and clamped; the
//! terminal fish level still cannot be left.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, UmiError};
use crate::store::{SessionState, StatChange, StatTarget};
use crate::types::{NpcStats, StatKey};

/// What an item does when used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEffect {
    /// Catalogue name.
    pub name: String,
    /// Whose stats change.
    pub target: StatTarget,
    /// Signed changes, applied in order.
    pub deltas: Vec<(StatKey, i32)>,
}

impl ItemEffect {
    /// Built-in item by catalogue name, targeting the player.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        let deltas = match name {
            "suspicious_sashimi" => vec![(StatKey::Corruption, 15), (StatKey::Hp, 10)],
            "holy_water" => vec![(StatKey::Hp, 10)],
            "deep_sea_pearl" => vec![(StatKey::UmiLevel, 5), (StatKey::Corruption, 5)],
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            target: StatTarget::Player,
            deltas,
        })
    }

    /// Names of all built-in items.
    #[must_use]
    pub fn builtin_names() -> &'static [&'static str] {
        &["suspicious_sashimi", "holy_water", "deep_sea_pearl"]
    }

    /// Apply every delta to `state`.
    ///
    /// # Errors
    /// Returns [`UmiError::UnknownStat`] if a delta names an NPC-only stat on
    /// the player. Keys are checked before any write, so a failing item
    /// leaves `state` untouched.
    pub fn apply(&self, state: &mut SessionState) -> Result<Vec<StatChange>> {
        if matches!(self.target, StatTarget::Player) {
            if let Some((key, _)) = self.deltas.iter().find(|(key, _)| state.player.get(key).is_none()) {
                return Err(UmiError::UnknownStat {
                    stat: key.name().to_string(),
                    target: self.target.to_string(),
                });
            }
        }

        let mut changes = Vec::with_capacity(self.deltas.len());
        for (key, delta) in &self.deltas {
            let current = match &self.target {
                StatTarget::Player => state.player.get(key),
                StatTarget::Npc(id) => state.npc(id).unwrap_or(&NpcStats::default()).get(key),
            }
            .unwrap_or(0);
            let outcome = state.set_stat(&self.target, key, i64::from(current) + i64::from(*delta))?;
            changes.push(StatChange {
                target: self.target.clone(),
                key: key.clone(),
                outcome,
            });
        }
        info!(item = %self.name, target = %self.target, writes = changes.len(), "Item used");
        Ok(changes)
    }
}
