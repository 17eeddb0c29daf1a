//! Comprehension masking of NPC speech across a corruption-tier gap.
//!
//! A listener below the speaker's tier loses whole words: each space-separated
//! token is independently replaced by a marker with probability
//! [`masking_rate`]. Trailing punctuation (`. , ! ? ~`) survives so sentence
//! rhythm stays readable.
//!
//! Randomness is always injected; tests pass a seeded or stepped generator.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tier::tier_of;

/// Marker substituted for a masked token.
pub const DEFAULT_MASK_MARKER: &str = "🫧";

/// Masking probability indexed by `min(speaker_tier - listener_tier, 4)`.
pub const MASKING_RATE_TABLE: [f64; 5] = [0.0, 0.20, 0.45, 0.70, 0.90];

/// Characters kept when they trail a masked token.
pub const TRAILING_PUNCTUATION: [char; 5] = ['.', ',', '!', '?', '~'];

/// Probability that a single token is masked for this speaker/listener pair.
///
/// Zero whenever the listener is at or above the speaker's tier.
#[must_use]
pub fn masking_rate(speaker_tier: u8, listener_tier: u8) -> f64 {
    let diff = i16::from(speaker_tier) - i16::from(listener_tier);
    if diff <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_sign_loss)]
    let index = diff.min(4) as usize;
    MASKING_RATE_TABLE[index]
}

/// Split a token into its body and trailing punctuation run.
#[must_use]
pub fn split_trailing_punctuation(token: &str) -> (&str, &str) {
    let body = token.trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c));
    (body, &token[body.len()..])
}

/// Mask `text` as spoken by an actor at `speaker_level` to one at
/// `listener_level`, using [`DEFAULT_MASK_MARKER`].
pub fn apply_masking<R: Rng + ?Sized>(
    text: &str,
    speaker_level: i32,
    listener_level: i32,
    rng: &mut R,
) -> String {
    Masker::default()
        .mask(text, speaker_level, listener_level, rng)
        .text
}

/// Outcome of a masking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedText {
    /// Output text.
    pub text: String,
    /// Rate that was applied.
    pub rate: f64,
    /// Non-empty tokens considered.
    pub eligible_tokens: usize,
    /// Tokens replaced by the marker.
    pub masked_tokens: usize,
}

impl MaskedText {
    fn unchanged(text: &str, rate: f64) -> Self {
        Self {
            text: text.to_string(),
            rate,
            eligible_tokens: 0,
            masked_tokens: 0,
        }
    }

    /// Fraction of eligible tokens that were masked.
    #[must_use]
    pub fn masked_fraction(&self) -> f64 {
        if self.eligible_tokens == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.masked_tokens as f64 / self.eligible_tokens as f64;
        fraction
    }
}

/// Masking transform with a configurable marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Masker {
    marker: String,
}

impl Masker {
    /// Create a masker emitting `marker` for hidden tokens.
    #[must_use]
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// The marker in use.
    #[must_use]
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Mask by corruption levels (tiers and rate are derived here).
    pub fn mask<R: Rng + ?Sized>(
        &self,
        text: &str,
        speaker_level: i32,
        listener_level: i32,
        rng: &mut R,
    ) -> MaskedText {
        let rate = masking_rate(tier_of(speaker_level), tier_of(listener_level));
        self.mask_at_rate(text, rate, rng)
    }

    /// Mask with an explicit per-token probability.
    ///
    /// Draws exactly one random value per non-empty token, in order, and none
    /// at all when `rate <= 0`.
    pub fn mask_at_rate<R: Rng + ?Sized>(&self, text: &str, rate: f64, rng: &mut R) -> MaskedText {
        if text.is_empty() || rate <= 0.0 {
            return MaskedText::unchanged(text, rate.max(0.0));
        }
        let p = rate.min(1.0);

        let mut eligible_tokens = 0;
        let mut masked_tokens = 0;
        let tokens: Vec<String> = text
            .split(' ')
            .map(|token| {
                if token.is_empty() {
                    return String::new();
                }
                eligible_tokens += 1;
                if !rng.gen_bool(p) {
                    return token.to_string();
                }
                masked_tokens += 1;
                let (_, punctuation) = split_trailing_punctuation(token);
                format!("{}{punctuation}", self.marker)
            })
            .collect();

        MaskedText {
            text: tokens.join(" "),
            rate: p,
            eligible_tokens,
            masked_tokens,
        }
    }
}

impl Default for Masker {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_MARKER)
    }
}
