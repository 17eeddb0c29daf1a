//! Dialogue turns end to end: mock and failing generators, a local stand-in
//! for Ollama, masking across fish tiers, items, persistence.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use umi_core::prompt_set::FALLBACK_TEMPLATE;
use umi_core::{
    CorruptionTier, InMemorySessionStore, NpcId, PromptRegistry, SessionId, StatInstruction, StatTarget,
    UmiConfig, WriteOutcome,
};
use umi_dialogue::{DialogueEngine, DialogueError};
use umi_llm::{LlmClient, LlmProvider};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with(client: LlmClient, config: &UmiConfig) -> DialogueEngine {
    DialogueEngine::new(
        Arc::new(InMemorySessionStore::with_template(config.session.template())),
        PromptRegistry::builtin(),
        client,
        config,
    )
    .with_rng(StdRng::seed_from_u64(7))
}

fn mock_engine() -> DialogueEngine {
    engine_with(LlmClient::mock(), &UmiConfig::default())
}

fn session() -> SessionId {
    SessionId::from("player-1")
}

/// Serve one canned Ollama `/api/chat` reply per connection, after `delay`.
async fn fake_ollama(content: &'static str, delay: Duration) -> String {
    serve_ollama(content, move |_| delay).await.0
}

/// Like [`fake_ollama`], with the delay chosen per connection (numbered from
/// 0). Also returns how many connections were accepted.
async fn serve_ollama(
    content: &'static str,
    delay_for: impl Fn(usize) -> Duration + Send + 'static,
) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let delay = delay_for(counter.fetch_add(1, Ordering::SeqCst));
            tokio::spawn(async move {
                read_request(&mut socket).await;
                tokio::time::sleep(delay).await;
                let body = serde_json::json!({
                    "message": { "role": "assistant", "content": content },
                    "eval_count": 42,
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (format!("http://{addr}"), hits)
}

async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return;
            }
        }
    }
}

fn ollama_engine(base_url: &str, timeout_ms: u64) -> DialogueEngine {
    ollama_engine_with_retries(base_url, timeout_ms, 0)
}

fn ollama_engine_with_retries(base_url: &str, timeout_ms: u64, retries: u32) -> DialogueEngine {
    let mut config = UmiConfig::default();
    config.llm.provider = "ollama".into();
    config.llm.base_url = base_url.into();
    config.llm.request_timeout_ms = timeout_ms;
    config.llm.max_retries = retries;
    let provider = LlmProvider::from_name("ollama", base_url, None).expect("provider");
    engine_with(LlmClient::new(provider, "qwen2.5:3b", retries), &config)
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mock_turn_uses_catalogue_stats() {
    let engine = mock_engine();
    let npc = NpcId::from("innkeeper");
    let turn = engine.send_message(&session(), &npc, "방 있어요?").await.expect("turn");

    assert!(!turn.used_fallback);
    assert!(turn.thought.is_some());
    assert!(!turn.say.is_empty());
    assert_eq!((turn.npc_stats.friendliness, turn.npc_stats.faith), (45, 60));
    assert_eq!(turn.speaker_tier, CorruptionTier::MildMutation);
    assert_eq!(turn.listener_tier, CorruptionTier::Normal);
    assert!((turn.masking_rate - 0.20).abs() < f64::EPSILON);
    assert_eq!(turn.instruction, StatInstruction::Neutral);

    let state = engine.session(&session()).expect("state");
    assert_eq!(state.history(&npc).len(), 2);
    assert_eq!(state.history(&npc)[1].text, turn.say);
}

#[tokio::test]
async fn no_provider_falls_back_to_mock() {
    let engine = engine_with(LlmClient::none(), &UmiConfig::default());
    let turn = engine
        .send_message(&session(), &NpcId::from("diver"), "바다에 들어가 봤어요?")
        .await
        .expect("turn");
    assert!(turn.used_fallback);
    assert!(turn.say.contains("바다"));
    assert_eq!(engine.counters().generator_fallbacks, 1);
}

#[tokio::test]
async fn unreachable_backend_falls_back() {
    let engine = ollama_engine("http://127.0.0.1:9", 300);
    let turn = engine
        .send_message(&session(), &NpcId::from("diver"), "안녕?")
        .await
        .expect("turn");
    assert!(turn.used_fallback);
    assert!(!turn.say.is_empty());
}

#[tokio::test]
async fn slow_backend_times_out_into_fallback() {
    let url = fake_ollama("SAY: 너무 늦었어요.", Duration::from_secs(5)).await;
    let engine = ollama_engine(&url, 100);
    let turn = engine
        .send_message(&session(), &NpcId::from("diver"), "거기 있어요?")
        .await
        .expect("turn");
    assert!(turn.used_fallback);
    assert_ne!(turn.say, "너무 늦었어요.");
}

#[tokio::test]
async fn stalled_first_attempt_is_retried() {
    let (url, hits) = serve_ollama("SAY: 두번째 시도", |n| {
        if n == 0 { Duration::from_secs(5) } else { Duration::ZERO }
    })
    .await;
    let engine = ollama_engine_with_retries(&url, 300, 2);
    let turn = engine
        .send_message(&session(), &NpcId::from("diver"), "들려요?")
        .await
        .expect("turn");
    assert!(!turn.used_fallback);
    assert_eq!(turn.say, "두번째 시도");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(engine.counters().generator_fallbacks, 0);
}

#[tokio::test]
async fn generated_stats_apply_but_fish_level_does_not() {
    let url = fake_ollama(
        "THOUGHT: 신앙이 깊은 아이로군.\nUPDATED_STATS: {'Friendly': 80, 'Fish_Level': 5}\nSAY: \"내일 새벽 예배에 오세요.\"",
        Duration::ZERO,
    )
    .await;
    let engine = ollama_engine(&url, 2000);
    let npc = NpcId::from("priest");
    let turn = engine.send_message(&session(), &npc, "기도하고 싶어요.").await.expect("turn");

    assert!(!turn.used_fallback);
    assert_eq!(turn.thought.as_deref(), Some("신앙이 깊은 아이로군."));
    assert_eq!(turn.say, "내일 새벽 예배에 오세요.");
    assert_eq!(turn.npc_stats.friendliness, 80);
    assert_eq!(turn.npc_stats.corruption, 75);
    assert_eq!(turn.player_stats.corruption, 0);
    assert_eq!(turn.instruction, StatInstruction::Devout);
    assert_eq!(engine.counters().corruption_updates_dropped, 1);
}

// ---------------------------------------------------------------------------
// Masking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_fish_npc_masks_for_normal_player() {
    let engine = mock_engine();
    let npc = NpcId::from("priest");
    engine
        .set_stat(&session(), &StatTarget::Npc(npc.clone()), "Fish_Level", 100)
        .await
        .expect("set");

    let turn = engine.send_message(&session(), &npc, "날씨가 좋네요").await.expect("turn");
    assert_eq!(turn.speaker_tier, CorruptionTier::FullFish);
    assert!((turn.masking_rate - 0.90).abs() < f64::EPSILON);
    assert_eq!(turn.masked_say.split(' ').count(), turn.say.split(' ').count());
}

#[tokio::test]
async fn equal_tiers_understand_each_other() {
    let engine = mock_engine();
    let npc = NpcId::from("priest");
    engine
        .set_stat(&session(), &StatTarget::Npc(npc.clone()), "fishLevel", 100)
        .await
        .expect("set npc");
    engine
        .set_stat(&session(), &StatTarget::Player, "Fish_Level", 100)
        .await
        .expect("set player");

    let turn = engine.send_message(&session(), &npc, "우리 둘 다 물고기네요").await.expect("turn");
    assert_eq!(turn.masked_say, turn.say);
    assert!(turn.game_over);
}

#[tokio::test]
async fn masking_can_be_disabled() {
    let mut config = UmiConfig::default();
    config.masking.enabled = false;
    let engine = engine_with(LlmClient::mock(), &config);
    let npc = NpcId::from("priest");
    engine
        .set_stat(&session(), &StatTarget::Npc(npc.clone()), "Fish_Level", 100)
        .await
        .expect("set");
    let turn = engine.send_message(&session(), &npc, "들려요?").await.expect("turn");
    assert_eq!(turn.masked_say, turn.say);
}

// ---------------------------------------------------------------------------
// Sessions and game logic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_npc_uses_fallback_template_and_defaults() {
    let engine = mock_engine();
    let turn = engine
        .send_message(&session(), &NpcId::from("stranger"), "누구세요?")
        .await
        .expect("turn");
    assert_eq!(turn.npc_stats, umi_core::NpcStats::default());
    assert_eq!(turn.masked_say, turn.say);
    assert!(engine.registry().profile(&NpcId::from("stranger")).is_none());
    assert_eq!(engine.registry().select(&NpcId::from("stranger"), 50), FALLBACK_TEMPLATE);
}

#[tokio::test]
async fn concurrent_turns_on_one_session_keep_every_line() {
    let engine = Arc::new(mock_engine());
    let npc = NpcId::from("diver");
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let npc = npc.clone();
            tokio::spawn(async move { engine.send_message(&session(), &npc, &format!("메시지 {i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("turn");
    }
    let state = engine.session(&session()).expect("state");
    assert_eq!(state.history(&npc).len(), 20);
    assert_eq!(engine.counters().turns, 10);
    assert_eq!(engine.active_sessions(), 0);
}

#[tokio::test]
async fn finished_sessions_release_their_turn_locks() {
    let engine = mock_engine();
    let npc = NpcId::from("innkeeper");
    let guests: Vec<SessionId> = (0..5).map(|_| SessionId::anonymous()).collect();
    for guest in &guests {
        engine.send_message(guest, &npc, "안녕하세요").await.expect("turn");
        engine.apply_item(guest, "holy_water").await.expect("item");
    }
    assert_eq!(engine.active_sessions(), 0);

    for guest in &guests {
        engine.reset_session(guest).await.expect("reset");
    }
    assert_eq!(engine.active_sessions(), 0);
    assert!(engine.session(&guests[0]).expect("state").npcs.is_empty());
}

#[tokio::test]
async fn items_move_player_stats() {
    let engine = mock_engine();
    let outcome = engine.apply_item(&session(), "suspicious_sashimi").await.expect("item");
    assert_eq!(outcome.player_stats.corruption, 15);
    assert_eq!(outcome.changes.len(), 2);

    let err = engine.apply_item(&session(), "rubber_duck").await.expect_err("unknown");
    assert!(matches!(err, DialogueError::UnknownItem(_)));
}

#[tokio::test]
async fn terminal_player_cannot_be_cured() {
    let engine = mock_engine();
    engine
        .set_stat(&session(), &StatTarget::Player, "Fish_Level", 150)
        .await
        .expect("set");
    let outcome = engine
        .set_stat(&session(), &StatTarget::Player, "Fish_Level", 0)
        .await
        .expect("set");
    assert_eq!(outcome, WriteOutcome::RefusedTerminal);
    assert_eq!(engine.session(&session()).expect("state").player.corruption, 100);
}

#[tokio::test]
async fn player_rejects_npc_stats() {
    let engine = mock_engine();
    let err = engine
        .set_stat(&session(), &StatTarget::Player, "Faith", 10)
        .await
        .expect_err("faith is per NPC");
    assert!(matches!(err, DialogueError::Core(umi_core::UmiError::UnknownStat { .. })));
}

#[tokio::test]
async fn reset_forgets_the_session() {
    let engine = mock_engine();
    let npc = NpcId::from("innkeeper");
    engine.send_message(&session(), &npc, "안녕하세요").await.expect("turn");
    engine.reset_session(&session()).await.expect("reset");
    let state = engine.session(&session()).expect("state");
    assert!(state.npcs.is_empty());
    assert!(state.history(&npc).is_empty());
}

#[tokio::test]
async fn sqlite_backend_persists_between_engines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = UmiConfig::default();
    config.session.backend = "sqlite".into();
    config.session.sqlite_path = dir.path().join("umi.db");

    {
        let engine = DialogueEngine::from_config(&config).expect("engine");
        engine.apply_item(&session(), "deep_sea_pearl").await.expect("item");
    }

    let engine = DialogueEngine::from_config(&config).expect("engine");
    let state = engine.session(&session()).expect("state");
    assert_eq!((state.player.umi_level, state.player.corruption), (5, 5));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut config = UmiConfig::default();
    config.session.backend = "redis".into();
    assert!(matches!(
        DialogueEngine::from_config(&config),
        Err(DialogueError::UnknownBackend(_))
    ));
}
