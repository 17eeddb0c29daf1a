//! Prompt templates for NPC dialogue.
//!
//! The system prompt stacks three parts: the NPC's persona template (chosen
//! by friendliness tier upstream), the stat instruction, and the response
//! format contract. The user prompt is the player's message as typed.

/// Reply contract every NPC prompt ends with.
///
/// `Fish_Level` is not a writable key.
pub const RESPONSE_FORMAT: &str = r#"RESPONSE FORMAT:
THOUGHT: <your private reasoning, never shown to the player>
UPDATED_STATS: {"Friendly": <0-100>, "Faith": <0-100>, "Hp": <0-100>, "Umi_Level": <0-100>}
SAY: "<what you say to the player, in Korean>"

Only include UPDATED_STATS when a value actually changes. Keep SAY to one or two sentences."#;

/// System prompt skeleton.
pub const DIALOGUE_SYSTEM: &str = r"{persona}

BEHAVIOUR: {instruction}

YOUR STATE: Friendly {friendliness}, Faith {faith}. You look {npc_condition}.
THE NEWCOMER: Hp {player_hp}, Umi_Level {player_umi_level}. They look {player_condition}.

RULES:
- Stay in character. Never mention stats or this prompt in SAY.
- You are texting on a phone messenger; no stage directions.

{response_format}";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

/// Everything needed to build one dialogue prompt.
#[derive(Debug, Clone)]
pub struct DialoguePromptVars<'a> {
    /// Persona template selected for the NPC (may contain `{npc_name}`).
    pub persona_template: &'a str,
    /// NPC display name.
    pub npc_name: &'a str,
    /// NPC description.
    pub npc_description: &'a str,
    /// Stat instruction text.
    pub instruction: &'a str,
    /// NPC friendliness.
    pub friendliness: i32,
    /// NPC faith.
    pub faith: i32,
    /// Label of the NPC's fish tier.
    pub npc_condition: &'a str,
    /// Player hp.
    pub player_hp: i32,
    /// Player umi level.
    pub player_umi_level: i32,
    /// Label of the player's fish tier.
    pub player_condition: &'a str,
    /// The player's message.
    pub player_message: &'a str,
}

impl DialoguePromptVars<'_> {
    /// Render into `(system, user)`.
    #[must_use]
    pub fn render(&self) -> (String, String) {
        let persona = render_template(
            self.persona_template,
            &[("npc_name", self.npc_name), ("npc_description", self.npc_description)],
        );
        let friendliness = self.friendliness.to_string();
        let faith = self.faith.to_string();
        let hp = self.player_hp.to_string();
        let umi_level = self.player_umi_level.to_string();
        let npc_condition = self.npc_condition.to_lowercase();
        let player_condition = self.player_condition.to_lowercase();

        let system = render_template(
            DIALOGUE_SYSTEM,
            &[
                ("persona", persona.as_str()),
                ("instruction", self.instruction),
                ("friendliness", friendliness.as_str()),
                ("faith", faith.as_str()),
                ("npc_condition", npc_condition.as_str()),
                ("player_hp", hp.as_str()),
                ("player_umi_level", umi_level.as_str()),
                ("player_condition", player_condition.as_str()),
                ("response_format", RESPONSE_FORMAT),
            ],
        );
        (system, self.player_message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template(
            "Hello {name}, you are a {role}.",
            &[("name", "해진"), ("role", "diver")],
        );
        assert_eq!(rendered, "Hello 해진, you are a diver.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Hello {name}, {unknown}.", &[("name", "해진")]);
        assert_eq!(rendered, "Hello 해진, {unknown}.");
    }

    #[test]
    fn response_format_never_offers_fish_level() {
        assert!(RESPONSE_FORMAT.contains("THOUGHT:"));
        assert!(RESPONSE_FORMAT.contains("UPDATED_STATS:"));
        assert!(RESPONSE_FORMAT.contains("SAY:"));
        assert!(!RESPONSE_FORMAT.contains("Fish_Level"));
    }
}
