//! Per-session stat state and the store abstraction that owns it.
//!
//! A [`SessionState`] holds the player record, one [`NpcStats`] per NPC the
//! player has talked to, and the chat history with each of them. Stores are
//! injected into the dialogue engine; [`SessionStore::update`] is an atomic
//! read-modify-write so concurrent turns on one session cannot lose writes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::response::RoutedPatch;
use crate::types::{ChatLine, NpcId, NpcStats, PlayerStats, SessionId, StatKey, WriteOutcome};

// ---------------------------------------------------------------------------
// Session State
// ---------------------------------------------------------------------------

/// Whose record a stat write targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum StatTarget {
    /// The session-wide player record.
    Player,
    /// One NPC's record.
    Npc(NpcId),
}

impl fmt::Display for StatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player"),
            Self::Npc(id) => write!(f, "npc:{id}"),
        }
    }
}

/// One write performed against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatChange {
    /// Record written.
    pub target: StatTarget,
    /// Stat written.
    pub key: StatKey,
    /// What happened.
    pub outcome: WriteOutcome,
}

/// Everything the engine knows about one play session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// The player.
    pub player: PlayerStats,
    /// NPCs met so far.
    #[serde(default)]
    pub npcs: BTreeMap<NpcId, NpcStats>,
    /// Chat history per NPC, oldest first.
    #[serde(default)]
    pub history: BTreeMap<NpcId, Vec<ChatLine>>,
}

impl SessionState {
    /// A fresh session with the given player record.
    #[must_use]
    pub fn new(player: PlayerStats) -> Self {
        Self {
            player,
            npcs: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }

    /// Stats of an NPC, if met.
    #[must_use]
    pub fn npc(&self, id: &NpcId) -> Option<&NpcStats> {
        self.npcs.get(id)
    }

    /// Stats of an NPC, inserting `init()` on first contact.
    pub fn npc_or_insert_with(&mut self, id: &NpcId, init: impl FnOnce() -> NpcStats) -> &mut NpcStats {
        self.npcs.entry(id.clone()).or_insert_with(init)
    }

    /// Deliberate write to the player record (may move corruption).
    ///
    /// # Errors
    /// Returns [`crate::UmiError::UnknownStat`] for NPC-only keys.
    pub fn set_player_stat(&mut self, key: &StatKey, value: i64) -> Result<WriteOutcome> {
        let outcome = self.player.set(key, value)?;
        log_outcome(&StatTarget::Player, key, value, outcome);
        Ok(outcome)
    }

    /// Deliberate write to an NPC record (may move corruption).
    pub fn set_npc_stat(&mut self, id: &NpcId, key: &StatKey, value: i64) -> WriteOutcome {
        let outcome = self.npc_or_insert_with(id, NpcStats::default).set(key, value);
        log_outcome(&StatTarget::Npc(id.clone()), key, value, outcome);
        outcome
    }

    /// Write to either record.
    ///
    /// # Errors
    /// Returns [`crate::UmiError::UnknownStat`] for NPC-only keys on the player.
    pub fn set_stat(&mut self, target: &StatTarget, key: &StatKey, value: i64) -> Result<WriteOutcome> {
        match target {
            StatTarget::Player => self.set_player_stat(key, value),
            StatTarget::Npc(id) => Ok(self.set_npc_stat(id, key, value)),
        }
    }

    /// Apply a routed patch from a generated reply spoken by `npc`.
    ///
    /// The patch has already had corruption removed; this never writes it.
    pub fn apply_generated(&mut self, npc: &NpcId, patch: &RoutedPatch) -> Vec<StatChange> {
        let mut changes = Vec::with_capacity(patch.npc.len() + patch.global.len());

        let stats = self.npc_or_insert_with(npc, NpcStats::default);
        for (key, value) in &patch.npc {
            if *key == StatKey::Corruption {
                continue;
            }
            changes.push(StatChange {
                target: StatTarget::Npc(npc.clone()),
                key: key.clone(),
                outcome: stats.set(key, *value),
            });
        }

        for (key, value) in &patch.global {
            if *key == StatKey::Corruption {
                continue;
            }
            match self.player.set(key, *value) {
                Ok(outcome) => changes.push(StatChange {
                    target: StatTarget::Player,
                    key: key.clone(),
                    outcome,
                }),
                Err(e) => warn!(error = %e, "Skipping generated player stat"),
            }
        }

        debug!(npc = %npc, writes = changes.len(), "Applied generated stats");
        changes
    }

    /// Append a chat line, keeping at most `max_history` lines for this NPC.
    pub fn push_history(&mut self, npc: &NpcId, line: ChatLine, max_history: usize) {
        let lines = self.history.entry(npc.clone()).or_default();
        lines.push(line);
        if lines.len() > max_history {
            let excess = lines.len() - max_history;
            lines.drain(..excess);
        }
    }

    /// Chat history with one NPC, oldest first.
    #[must_use]
    pub fn history(&self, npc: &NpcId) -> &[ChatLine] {
        self.history.get(npc).map_or(&[], Vec::as_slice)
    }
}

fn log_outcome(target: &StatTarget, key: &StatKey, value: i64, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Applied { previous, current } => {
            debug!(target = %target, stat = %key, requested = value, previous, current, "Stat written");
        }
        WriteOutcome::RefusedTerminal => {
            warn!(target = %target, stat = %key, requested = value, "Refusing write to terminal fish level");
        }
    }
}

// ---------------------------------------------------------------------------
// Store Trait
// ---------------------------------------------------------------------------

/// Keyed storage of [`SessionState`]s.
pub trait SessionStore: Send + Sync {
    /// Current state of a session (the template if it has never been written).
    ///
    /// # Errors
    /// Back-end failures.
    fn load(&self, session: &SessionId) -> Result<SessionState>;

    /// Atomically apply `f` to a session's state and persist the result.
    ///
    /// # Errors
    /// Back-end failures; `f` has then had no lasting effect.
    fn update(&self, session: &SessionId, f: &mut dyn FnMut(&mut SessionState)) -> Result<SessionState>;

    /// Forget a session entirely.
    ///
    /// # Errors
    /// Back-end failures.
    fn reset(&self, session: &SessionId) -> Result<()>;

    /// All sessions with stored state, sorted.
    ///
    /// # Errors
    /// Back-end failures.
    fn sessions(&self) -> Result<Vec<SessionId>>;
}

// ---------------------------------------------------------------------------
// In-memory Store
// ---------------------------------------------------------------------------

/// Process-local store; state is lost on exit.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    template: SessionState,
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl InMemorySessionStore {
    /// Empty store whose new sessions start from `SessionState::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store whose new sessions start from `template`.
    #[must_use]
    pub fn with_template(template: SessionState) -> Self {
        Self {
            template,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, session: &SessionId) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock();
        Arc::clone(
            sessions
                .entry(session.clone())
                .or_insert_with(|| Arc::new(Mutex::new(self.template.clone()))),
        )
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, session: &SessionId) -> Result<SessionState> {
        let slot = self.sessions.lock().get(session).cloned();
        Ok(slot.map_or_else(|| self.template.clone(), |s| s.lock().clone()))
    }

    fn update(&self, session: &SessionId, f: &mut dyn FnMut(&mut SessionState)) -> Result<SessionState> {
        let slot = self.slot(session);
        let mut state = slot.lock();
        f(&mut state);
        Ok(state.clone())
    }

    fn reset(&self, session: &SessionId) -> Result<()> {
        self.sessions.lock().remove(session);
        debug!(session = %session, "Session reset");
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<SessionId>> {
        let mut ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
