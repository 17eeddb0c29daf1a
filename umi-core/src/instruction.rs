//! Stat-driven behaviour instruction injected into the NPC prompt.
//!
//! A decision table over faith and friendliness. The first matching rule wins,
//! so a devout NPC stays devout even when it dislikes the player.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which canned instruction the NPC receives this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatInstruction {
    /// Faith ≥ 80: unconditional trust, blesses the listener.
    Devout,
    /// Faith < 40 and friendliness ≥ 70: confides secrets, wants to help escape.
    Doubtful,
    /// Friendliness < 30: cold, treats the listener as a contaminant.
    Hostile,
    /// Everything else: friendly but hollow.
    Neutral,
}

/// Pick the instruction for an NPC with the given stats.
#[must_use]
pub fn select_instruction(faith: i32, friendliness: i32) -> StatInstruction {
    if faith >= 80 {
        StatInstruction::Devout
    } else if faith < 40 && friendliness >= 70 {
        StatInstruction::Doubtful
    } else if friendliness < 30 {
        StatInstruction::Hostile
    } else {
        StatInstruction::Neutral
    }
}

impl StatInstruction {
    /// Instruction text appended to the NPC's system prompt.
    #[must_use]
    pub fn text(self) -> &'static str {
        match self {
            Self::Devout => {
                "You believe in the sea with your whole heart. Trust the listener without \
                 condition, speak of the coming tide as a blessing, and bless them before they leave."
            }
            Self::Doubtful => {
                "Your faith is cracking and you have grown fond of the listener. Speak quietly, \
                 hint at what the village hides, and let them know you want to help them escape."
            }
            Self::Hostile => {
                "You do not like the listener. Be cold and curt, keep your distance, and treat \
                 them as something unclean that washed in from outside."
            }
            Self::Neutral => {
                "Be polite and warm on the surface, but keep your answers empty. Smile, deflect, \
                 and never say anything that matters."
            }
        }
    }

    /// Short identifier for logs and front-end badges.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Devout => "devout",
            Self::Doubtful => "doubtful",
            Self::Hostile => "hostile",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for StatInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
