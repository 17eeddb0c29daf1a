//! Deterministic canned replies.
//!
//! Serves as the `Mock` provider and as the fallback whenever a real back end
//! fails or times out. The same NPC name and player message always produce
//! the same reply. Replies carry THOUGHT and SAY sections but never a stat
//! block, so a fallback turn leaves every stat untouched.

use crate::prompt::render_template;

const GREETING: (&str, &str) = (
    "조용한 사람이군. 먼저 말을 걸어 줘야겠어.",
    "...여보세요? 저는 {npc_name}, 이 마을 사람이에요. 무슨 일로 연락하셨어요?",
);

const SEA: (&str, &str) = (
    "바다 얘기를 꺼내다니, 벌써 부름을 들은 걸까.",
    "바다요? 바다는 언제나 우리를 기다리고 있어요. 너무 깊이 생각하지 마세요.",
);

const ESCAPE: (&str, &str) = (
    "떠나겠다고? 그 말은 누구에게도 들려서는 안 돼.",
    "쉿, 그런 말은 여기서 하면 안 돼요. 나중에 다시 얘기해요.",
);

const GENERIC: [(&str, &str); 5] = [
    (
        "무난하게 넘기자.",
        "그렇군요. 이 마을은 조용해서 금방 익숙해지실 거예요.",
    ),
    (
        "눈치챈 건 아니겠지.",
        "하하, 재미있는 분이시네요. 오늘 밤은 창문을 꼭 닫고 주무세요.",
    ),
    (
        "말을 아껴야 해.",
        "음... 그건 {npc_name}도 잘 모르겠어요. 다른 분께 여쭤 보세요.",
    ),
    (
        "비린내가 나는 걸 들키면 안 돼.",
        "아, 잠깐만요. 손이 젖어서요. 네, 듣고 있어요.",
    ),
    (
        "친절하게 대해 주자. 지금은.",
        "걱정 마세요. 여기 사람들은 다 좋은 사람들이에요. 정말로요.",
    ),
];

/// Deterministic reply generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackend;

impl MockBackend {
    /// Create a mock back end.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Canned `THOUGHT:` / `SAY:` reply for `player_message` from `npc_name`.
    #[must_use]
    pub fn reply(&self, npc_name: &str, player_message: &str) -> String {
        let (thought, say) = Self::pick(player_message);
        let say = render_template(say, &[("npc_name", npc_name)]);
        format!("THOUGHT: {thought}\nSAY: \"{say}\"")
    }

    fn pick(message: &str) -> (&'static str, &'static str) {
        let message = message.trim();
        if message.is_empty() {
            return GREETING;
        }
        if message.contains("바다") || message.to_lowercase().contains("sea") {
            return SEA;
        }
        if ["탈출", "도망", "떠나"].iter().any(|k| message.contains(k))
            || message.to_lowercase().contains("escape")
        {
            return ESCAPE;
        }
        let hash = message
            .chars()
            .fold(0u64, |acc, c| acc.wrapping_mul(31).wrapping_add(u64::from(c)));
        // `hash % len` is always below GENERIC.len().
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % GENERIC.len() as u64) as usize;
        GENERIC[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_reply() {
        let mock = MockBackend::new();
        assert_eq!(mock.reply("해진", "안녕하세요"), mock.reply("해진", "안녕하세요"));
    }

    #[test]
    fn reply_has_sections_but_no_stats() {
        let reply = MockBackend::new().reply("해진", "오늘 날씨 어때요?");
        assert!(reply.starts_with("THOUGHT: "));
        assert!(reply.contains("\nSAY: \""));
        assert!(!reply.contains("UPDATED_STATS"));
    }

    #[test]
    fn keywords_pick_themed_lines() {
        let mock = MockBackend::new();
        assert!(mock.reply("조 여사", "바다가 무서워요").contains("바다는 언제나"));
        assert!(mock.reply("조 여사", "여기서 탈출하고 싶어요").contains("쉿"));
    }

    #[test]
    fn empty_message_greets_by_name() {
        assert!(MockBackend::new().reply("길 신부", "  ").contains("저는 길 신부, 이 마을"));
    }
}
