//! One dialogue turn, end to end.
//!
//! ```text
//! player message
//!   → per-session turn lock
//!   → load stats → select prompt (friendliness tier) + stat instruction
//!   → generate (bounded timeout; mock reply on failure)
//!   → parse THOUGHT / UPDATED_STATS / SAY, drop fish-level writes
//!   → store.update (stats + history)
//!   → mask SAY by speaker/listener fish tier
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};
use tracing::{debug, info, warn};

use umi_core::config::UmiConfig;
use umi_core::masking::MaskedText;
use umi_core::metrics::{CounterSnapshot, DialogueCounters};
use umi_core::prompt_set::NpcProfile;
use umi_core::{
    ChatLine, CorruptionTier, InMemorySessionStore, ItemEffect, Masker, NpcId, NpcStats, PlayerStats,
    PromptRegistry, RoutedPatch, SessionId, SessionState, SessionStore, Speaker, SqliteSessionStore,
    StatChange, StatInstruction, StatKey, StatTarget, WriteOutcome, parse_response, select_instruction,
};
use umi_llm::prompt::DialoguePromptVars;
use umi_llm::{ChatTurn, LlmClient, LlmProvider, LlmRequest, MockBackend};

use crate::error::{DialogueError, Result};

// ---------------------------------------------------------------------------
// Turn Result
// ---------------------------------------------------------------------------

/// Everything the front end needs to render one NPC reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueTurn {
    /// Speaking NPC.
    pub npc: NpcId,
    /// Private reasoning (never masked, never shown in-game).
    pub thought: Option<String>,
    /// What the NPC said, unmasked.
    pub say: String,
    /// What the player perceives.
    pub masked_say: String,
    /// Instruction injected this turn.
    pub instruction: StatInstruction,
    /// Speaker's fish tier after the turn.
    pub speaker_tier: CorruptionTier,
    /// Player's fish tier.
    pub listener_tier: CorruptionTier,
    /// Per-token masking probability applied.
    pub masking_rate: f64,
    /// NPC stats after the turn.
    pub npc_stats: NpcStats,
    /// Player stats after the turn.
    pub player_stats: PlayerStats,
    /// Whether the mock stood in for the generator.
    pub used_fallback: bool,
    /// Whether the player has reached Full-Fish.
    pub game_over: bool,
}

/// Result of using an item.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// Writes performed.
    pub changes: Vec<StatChange>,
    /// Player stats afterwards.
    pub player_stats: PlayerStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Slack on top of the per-attempt timeouts for connection setup and backoff.
const GENERATION_MARGIN: Duration = Duration::from_millis(250);

type TurnLocks = Mutex<HashMap<SessionId, Arc<TurnLock<()>>>>;

#[derive(Debug, Clone)]
struct TurnSettings {
    /// Per HTTP attempt.
    attempt_timeout: Duration,
    /// Whole generation, every retry included.
    generation_budget: Duration,
    temperature: f32,
    max_tokens: u32,
    max_history: usize,
    masking_enabled: bool,
    default_npc: NpcStats,
}

impl TurnSettings {
    fn from_config(config: &UmiConfig) -> Self {
        let attempt_timeout = Duration::from_millis(config.llm.request_timeout_ms);
        Self {
            attempt_timeout,
            generation_budget: attempt_timeout
                .saturating_mul(config.llm.max_retries.saturating_add(1))
                .saturating_add(GENERATION_MARGIN),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_history: config.session.max_history,
            masking_enabled: config.masking.enabled,
            default_npc: config.session.default_npc.clone(),
        }
    }
}

/// Orchestrates dialogue turns against an injected store and generator.
pub struct DialogueEngine {
    store: Arc<dyn SessionStore>,
    registry: PromptRegistry,
    client: LlmClient,
    mock: MockBackend,
    masker: Masker,
    rng: Mutex<StdRng>,
    counters: DialogueCounters,
    turn_locks: TurnLocks,
    settings: TurnSettings,
}

impl std::fmt::Debug for DialogueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueEngine")
            .field("npcs", &self.registry.len())
            .field("provider", self.client.provider())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DialogueEngine {
    /// Assemble an engine from parts. Masking RNG follows `[masking].seed`.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: PromptRegistry,
        client: LlmClient,
        config: &UmiConfig,
    ) -> Self {
        let rng = config
            .masking
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            store,
            registry,
            client,
            mock: MockBackend::new(),
            masker: Masker::new(config.masking.marker.clone()),
            rng: Mutex::new(rng),
            counters: DialogueCounters::new(),
            turn_locks: Mutex::new(HashMap::new()),
            settings: TurnSettings::from_config(config),
        }
    }

    /// Build store, catalogue and client from configuration.
    ///
    /// # Errors
    /// Fails on an unknown backend or provider, an unreadable catalogue, or
    /// a database that cannot be opened.
    pub fn from_config(config: &UmiConfig) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match config.session.backend.as_str() {
            "memory" => Arc::new(InMemorySessionStore::with_template(config.session.template())),
            "sqlite" => Arc::new(SqliteSessionStore::open(&config.session.sqlite_path, &config.session)?),
            other => return Err(DialogueError::UnknownBackend(other.to_string())),
        };
        let registry = match &config.prompts.npc_file {
            Some(path) => PromptRegistry::from_file(path)?,
            None => PromptRegistry::builtin(),
        };
        let provider = LlmProvider::from_name(&config.llm.provider, &config.llm.base_url, config.llm.api_key.as_deref())?;
        let client = LlmClient::new(provider, config.llm.model.clone(), config.llm.max_retries);

        info!(
            backend = %config.session.backend,
            provider = %config.llm.provider,
            npcs = registry.len(),
            "Dialogue engine ready"
        );
        Ok(Self::new(store, registry, client, config))
    }

    /// Replace the masking RNG (tests pass a seeded generator).
    #[must_use]
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            ..self
        }
    }

    /// The NPC catalogue.
    #[must_use]
    pub fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    async fn begin_turn(&self, session: &SessionId) -> TurnPermit<'_> {
        let lock = Arc::clone(
            self.turn_locks
                .lock()
                .entry(session.clone())
                .or_insert_with(|| Arc::new(TurnLock::new(()))),
        );
        let guard = Arc::clone(&lock).lock_owned().await;
        TurnPermit {
            locks: &self.turn_locks,
            session: session.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Sessions currently holding or waiting on a turn lock.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.turn_locks.lock().len()
    }

    fn initial_npc(&self, profile: Option<&NpcProfile>) -> NpcStats {
        profile.map_or_else(
            || self.settings.default_npc.clone(),
            |p| p.initial_stats(&self.settings.default_npc),
        )
    }

    // -----------------------------------------------------------------------
    // Dialogue
    // -----------------------------------------------------------------------

    /// Run one turn: the player says `message` to `npc`.
    ///
    /// Generator failures and timeouts are absorbed by the mock reply.
    ///
    /// # Errors
    /// Only session-store failures surface here.
    pub async fn send_message(&self, session: &SessionId, npc: &NpcId, message: &str) -> Result<DialogueTurn> {
        let start = Instant::now();
        let _turn = self.begin_turn(session).await;

        let state = self.store.load(session)?;
        let profile = self.registry.profile(npc);
        let npc_name = profile.map_or(npc.as_str(), |p| p.name.as_str());
        let npc_description = profile.map_or("", |p| p.description.as_str());
        let initial = self.initial_npc(profile);
        let before = state.npc(npc).cloned().unwrap_or_else(|| initial.clone());

        let instruction = select_instruction(before.faith, before.friendliness);
        let (system, user) = DialoguePromptVars {
            persona_template: self.registry.select(npc, before.friendliness),
            npc_name,
            npc_description,
            instruction: instruction.text(),
            friendliness: before.friendliness,
            faith: before.faith,
            npc_condition: CorruptionTier::from_level(before.corruption).label(),
            player_hp: state.player.hp,
            player_umi_level: state.player.umi_level,
            player_condition: CorruptionTier::from_level(state.player.corruption).label(),
            player_message: message,
        }
        .render();

        let request = LlmRequest::dialogue(system, user)
            .with_history(chat_turns(state.history(npc)))
            .with_npc_name(npc_name)
            .with_sampling(self.settings.temperature, self.settings.max_tokens)
            .with_timeout(u64::try_from(self.settings.attempt_timeout.as_millis()).unwrap_or(u64::MAX));

        let (raw, used_fallback) = self.generate(session, npc, npc_name, message, &request).await;

        let parsed = parse_response(&raw);
        if parsed.stats_failed() {
            DialogueCounters::add(&self.counters.stat_parse_failures, 1);
        }
        let mut routed = parsed.patch().map(umi_core::StatPatch::route).unwrap_or_default();
        DialogueCounters::add(&self.counters.corruption_updates_dropped, routed.dropped.len() as u64);
        if state.player.is_terminal() && !routed.is_empty() {
            info!(session = %session, npc = %npc, "Player is Full-Fish; ignoring generated stats");
            routed = RoutedPatch::default();
        }

        let max_history = self.settings.max_history;
        let say = parsed.say.clone();
        let updated = self.store.update(session, &mut |s| {
            s.npc_or_insert_with(npc, || initial.clone());
            s.apply_generated(npc, &routed);
            s.push_history(npc, ChatLine::now(Speaker::Player, message), max_history);
            s.push_history(npc, ChatLine::now(Speaker::Npc, say.as_str()), max_history);
        })?;

        let npc_stats = updated.npc(npc).cloned().unwrap_or(before);
        let masked = self.mask(&parsed.say, npc_stats.corruption, updated.player.corruption);

        DialogueCounters::add(&self.counters.turns, 1);
        DialogueCounters::add(&self.counters.tokens_seen, masked.eligible_tokens as u64);
        DialogueCounters::add(&self.counters.tokens_masked, masked.masked_tokens as u64);

        let turn = DialogueTurn {
            npc: npc.clone(),
            thought: parsed.thought,
            say: parsed.say,
            masked_say: masked.text,
            instruction,
            speaker_tier: CorruptionTier::from_level(npc_stats.corruption),
            listener_tier: CorruptionTier::from_level(updated.player.corruption),
            masking_rate: masked.rate,
            npc_stats,
            player_stats: updated.player,
            used_fallback,
            game_over: updated.player.is_terminal(),
        };
        debug!(
            session = %session,
            npc = %npc,
            instruction = %turn.instruction,
            speaker_tier = turn.speaker_tier.index(),
            listener_tier = turn.listener_tier.index(),
            rate = turn.masking_rate,
            fallback = used_fallback,
            elapsed_ms = start.elapsed().as_millis(),
            "Dialogue turn complete"
        );
        Ok(turn)
    }

    async fn generate(
        &self,
        session: &SessionId,
        npc: &NpcId,
        npc_name: &str,
        message: &str,
        request: &LlmRequest,
    ) -> (String, bool) {
        match tokio::time::timeout(self.settings.generation_budget, self.client.generate(request)).await {
            Ok(Ok(response)) if !response.text.trim().is_empty() => return (response.text, false),
            Ok(Ok(_)) => warn!(session = %session, npc = %npc, "Generator returned an empty reply; using mock"),
            Ok(Err(e)) => warn!(session = %session, npc = %npc, error = %e, "Generator failed; using mock"),
            Err(_) => warn!(
                session = %session,
                npc = %npc,
                budget_ms = self.settings.generation_budget.as_millis(),
                "Generator timed out; using mock"
            ),
        }
        DialogueCounters::add(&self.counters.generator_fallbacks, 1);
        (self.mock.reply(npc_name, message), true)
    }

    fn mask(&self, say: &str, speaker_level: i32, listener_level: i32) -> MaskedText {
        if !self.settings.masking_enabled {
            return MaskedText {
                text: say.to_string(),
                rate: 0.0,
                eligible_tokens: 0,
                masked_tokens: 0,
            };
        }
        let mut rng = self.rng.lock();
        self.masker.mask(say, speaker_level, listener_level, &mut *rng)
    }

    /// Re-mask an earlier line for the current tiers (history view).
    #[must_use]
    pub fn perceive(&self, text: &str, speaker_level: i32, listener_level: i32) -> String {
        self.mask(text, speaker_level, listener_level).text
    }

    // -----------------------------------------------------------------------
    // Deliberate game logic
    // -----------------------------------------------------------------------

    /// Use a built-in item on the player.
    ///
    /// # Errors
    /// [`DialogueError::UnknownItem`] for an unknown name; store failures.
    pub async fn apply_item(&self, session: &SessionId, item: &str) -> Result<ItemOutcome> {
        let effect = ItemEffect::builtin(item).ok_or_else(|| DialogueError::UnknownItem(item.to_string()))?;
        let _turn = self.begin_turn(session).await;

        let mut applied = None;
        let state = self.store.update(session, &mut |s| applied = Some(effect.apply(s)))?;
        let changes = applied.transpose()?.unwrap_or_default();
        Ok(ItemOutcome {
            changes,
            player_stats: state.player,
        })
    }

    /// Explicitly set one stat (scenario scripting, debug tools).
    ///
    /// Unlike generated replies this may write fish level; the terminal rule
    /// still applies.
    ///
    /// # Errors
    /// [`umi_core::UmiError::UnknownStat`] for NPC-only stats on the player;
    /// store failures.
    pub async fn set_stat(&self, session: &SessionId, target: &StatTarget, stat: &str, value: i64) -> Result<WriteOutcome> {
        let key = StatKey::from_raw(stat);
        let initial = match target {
            StatTarget::Npc(id) => Some(self.initial_npc(self.registry.profile(id))),
            StatTarget::Player => None,
        };
        let _turn = self.begin_turn(session).await;

        let mut outcome = None;
        self.store.update(session, &mut |s| {
            if let (StatTarget::Npc(id), Some(initial)) = (target, &initial) {
                s.npc_or_insert_with(id, || initial.clone());
            }
            outcome = Some(s.set_stat(target, &key, value));
        })?;
        match outcome {
            Some(result) => Ok(result?),
            None => Err(DialogueError::Core(umi_core::UmiError::Config("stat update did not run".into()))),
        }
    }

    /// Current state of a session.
    ///
    /// # Errors
    /// Store failures.
    pub fn session(&self, session: &SessionId) -> Result<SessionState> {
        Ok(self.store.load(session)?)
    }

    /// Forget everything about a session.
    ///
    /// # Errors
    /// Store failures.
    pub async fn reset_session(&self, session: &SessionId) -> Result<()> {
        let _turn = self.begin_turn(session).await;
        self.store.reset(session)?;
        info!(session = %session, "Session reset");
        Ok(())
    }

    /// Counter snapshot.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}

/// Exclusive turn on one session. Dropping it forgets the session's lock once
/// nobody else holds or waits on it.
struct TurnPermit<'a> {
    locks: &'a TurnLocks,
    session: SessionId,
    lock: Arc<TurnLock<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnPermit<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock();
        // The map entry and this permit are the only handles left.
        let idle = locks
            .get(&self.session)
            .is_some_and(|current| Arc::ptr_eq(current, &self.lock) && Arc::strong_count(&self.lock) == 2);
        if idle {
            locks.remove(&self.session);
        }
    }
}

fn chat_turns(lines: &[ChatLine]) -> Vec<ChatTurn> {
    lines
        .iter()
        .map(|line| match line.speaker {
            Speaker::Player => ChatTurn::user(line.text.clone()),
            Speaker::Npc => ChatTurn::assistant(line.text.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_maps_to_chat_roles() {
        let lines = vec![
            ChatLine::now(Speaker::Player, "안녕"),
            ChatLine::now(Speaker::Npc, "어서 와요"),
        ];
        let turns = chat_turns(&lines);
        assert_eq!(turns[0], ChatTurn::user("안녕"));
        assert_eq!(turns[1], ChatTurn::assistant("어서 와요"));
    }

    #[test]
    fn disabled_masking_is_verbatim() {
        let mut config = UmiConfig::default();
        config.masking.enabled = false;
        let engine = DialogueEngine::new(
            Arc::new(InMemorySessionStore::new()),
            PromptRegistry::builtin(),
            LlmClient::mock(),
            &config,
        );
        assert_eq!(engine.perceive("바다가 부른다", 100, 0), "바다가 부른다");
    }
}
