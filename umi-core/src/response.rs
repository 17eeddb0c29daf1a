//! Post-processing of generated NPC replies.
//!
//! Generators are asked to answer in three optional sections:
//!
//! ```text
//! THOUGHT: private reasoning, never shown to the player
//! UPDATED_STATS: {'Friendly': 62, 'Faith': 80}
//! SAY: "the line the NPC actually says"
//! ```
//!
//! Each section is searched for independently, so missing or reordered
//! sections degrade gracefully. The stat block is parsed best-effort: single
//! quotes are normalised and a parse failure means "no update", never an
//! aborted turn. Corruption keys (`Fish_Level` and friends) are always
//! dropped during routing; generated text can never move an actor's fish level.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{StatBucket, StatKey};

const THOUGHT_MARKER: &str = "THOUGHT:";
const STATS_MARKER: &str = "UPDATED_STATS:";

static THOUGHT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)THOUGHT:\s*(.*?)\s*(?:UPDATED_STATS:|SAY:|\z)").ok()
});

static SAY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?s)SAY:\s*(.*?)\s*(?:THOUGHT:|UPDATED_STATS:|\z)").ok()
});

/// Why a stat block could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatParseError {
    /// `UPDATED_STATS:` was not followed by `{`.
    #[error("UPDATED_STATS is not followed by an object")]
    NoObject,
    /// The object never closes.
    #[error("UPDATED_STATS object is not balanced")]
    Unbalanced,
    /// The object is not valid JSON after quote normalisation.
    #[error("UPDATED_STATS is not valid JSON: {0}")]
    Json(String),
    /// Valid JSON, but not an object.
    #[error("UPDATED_STATS is not a JSON object")]
    NotAnObject,
}

/// One stat assignment from a generated block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    /// Key as the generator wrote it.
    pub raw_key: String,
    /// Normalised key.
    pub key: StatKey,
    /// Requested value (clamped later, on write).
    pub value: i64,
}

/// All assignments parsed from one `UPDATED_STATS` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatPatch {
    /// Entries in block order.
    pub entries: Vec<StatEntry>,
}

/// A patch split by destination, with corruption writes removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedPatch {
    /// Writes to the speaking NPC's record.
    pub npc: Vec<(StatKey, i64)>,
    /// Writes to the session-wide player record.
    pub global: Vec<(StatKey, i64)>,
    /// Raw keys that were discarded (corruption / fish level).
    pub dropped: Vec<String>,
}

impl RoutedPatch {
    /// Whether nothing will be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.npc.is_empty() && self.global.is_empty()
    }
}

impl StatPatch {
    /// Split entries into NPC and player writes.
    ///
    /// Corruption entries are discarded unconditionally: fish level is
    /// scenario-controlled and generated content may not write it.
    #[must_use]
    pub fn route(&self) -> RoutedPatch {
        let mut routed = RoutedPatch::default();
        for entry in &self.entries {
            if entry.key == StatKey::Corruption {
                info!(
                    key = %entry.raw_key,
                    value = entry.value,
                    "Dropping generated fish-level update"
                );
                routed.dropped.push(entry.raw_key.clone());
                continue;
            }
            match entry.key.bucket() {
                StatBucket::Npc => routed.npc.push((entry.key.clone(), entry.value)),
                StatBucket::Global => routed.global.push((entry.key.clone(), entry.value)),
            }
        }
        routed
    }
}

/// Sections extracted from a raw generated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Private reasoning, if present.
    pub thought: Option<String>,
    /// `None` when there is no `UPDATED_STATS` section at all.
    pub stats: Option<Result<StatPatch, StatParseError>>,
    /// The spoken line (never empty unless the reply was empty).
    pub say: String,
}

impl ParsedResponse {
    /// The parsed patch, if there was one and it parsed.
    #[must_use]
    pub fn patch(&self) -> Option<&StatPatch> {
        self.stats.as_ref().and_then(|r| r.as_ref().ok())
    }

    /// Whether a stat block was present but unreadable.
    #[must_use]
    pub fn stats_failed(&self) -> bool {
        matches!(self.stats, Some(Err(_)))
    }
}

/// Extract THOUGHT, UPDATED_STATS and SAY from a generated reply.
#[must_use]
pub fn parse_response(raw: &str) -> ParsedResponse {
    let thought = thought_span(raw).map(|span| raw[span].to_string());

    let stats = stats_block(raw).map(|block| block.and_then(parse_stat_block));
    if let Some(Err(e)) = &stats {
        warn!(error = %e, "Ignoring unreadable UPDATED_STATS block");
    }

    let say = match say_span(raw) {
        Some(span) => strip_wrapping_quotes(&raw[span]).to_string(),
        None => {
            debug!("No SAY section; using reply with other sections removed");
            strip_wrapping_quotes(strip_sections(raw).trim()).to_string()
        }
    };

    ParsedResponse {
        thought: thought.filter(|t| !t.is_empty()),
        stats,
        say,
    }
}

/// Parse a `{...}` stat object permissively.
///
/// # Errors
/// Returns a [`StatParseError`] if the block is not a JSON object after
/// single quotes are replaced with double quotes.
pub fn parse_stat_block(block: &str) -> Result<StatPatch, StatParseError> {
    let normalised = block.replace('\'', "\"");
    let value: serde_json::Value =
        serde_json::from_str(&normalised).map_err(|e| StatParseError::Json(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(StatParseError::NotAnObject);
    };

    let mut patch = StatPatch::default();
    for (raw_key, value) in map {
        let Some(number) = numeric_value(&value) else {
            debug!(key = %raw_key, value = %value, "Skipping non-numeric stat");
            continue;
        };
        patch.entries.push(StatEntry {
            key: StatKey::from_raw(&raw_key),
            raw_key,
            value: number,
        });
    }
    Ok(patch)
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_value(value: &serde_json::Value) -> Option<i64> {
    let float = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    float.is_finite().then(|| float.round() as i64)
}

fn thought_span(raw: &str) -> Option<Range<usize>> {
    let re = THOUGHT_RE.as_ref()?;
    re.captures(raw)?.get(1).map(|m| m.range())
}

fn say_span(raw: &str) -> Option<Range<usize>> {
    let re = SAY_RE.as_ref()?;
    re.captures(raw)?.get(1).map(|m| m.range())
}

/// Locate the stat object after `UPDATED_STATS:`.
///
/// `None` when the marker is absent; `Some(Err)` when it is present but not
/// followed by a balanced object.
fn stats_block(raw: &str) -> Option<Result<&str, StatParseError>> {
    let marker = raw.find(STATS_MARKER)?;
    Some(balanced_object(raw, marker + STATS_MARKER.len()).map(|range| &raw[range]))
}

fn balanced_object(raw: &str, from: usize) -> Result<Range<usize>, StatParseError> {
    let rest = &raw[from..];
    let offset = rest.len() - rest.trim_start().len();
    let start = from + offset;
    if !raw[start..].starts_with('{') {
        return Err(StatParseError::NoObject);
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in raw[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(start..start + i + 1);
                }
            }
            _ => {}
        }
    }
    Err(StatParseError::Unbalanced)
}

/// Remove the THOUGHT and UPDATED_STATS sections (markers included).
fn strip_sections(raw: &str) -> String {
    let mut cuts: Vec<Range<usize>> = Vec::new();

    if let (Some(marker), Some(body)) = (raw.find(THOUGHT_MARKER), thought_span(raw)) {
        cuts.push(marker..body.end);
    }
    if let Some(marker) = raw.find(STATS_MARKER) {
        let after = marker + STATS_MARKER.len();
        let end = balanced_object(raw, after).map_or(after, |r| r.end);
        cuts.push(marker..end);
    }
    cuts.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for cut in cuts {
        if cut.start < cursor {
            cursor = cursor.max(cut.end);
            continue;
        }
        out.push_str(&raw[cursor..cut.start]);
        cursor = cut.end;
    }
    out.push_str(&raw[cursor..]);
    out
}

fn strip_wrapping_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
