//! Configuration for the UMI dialogue engine.
//!
//! Maps directly to `umi.toml`. Every field has a default, so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::masking::DEFAULT_MASK_MARKER;
use crate::store::SessionState;
use crate::types::{NpcStats, PlayerStats};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UmiConfig {
    /// Logging.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Comprehension masking.
    #[serde(default)]
    pub masking: MaskingConfig,
    /// Text-generation back end.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Session storage and starting stats.
    #[serde(default)]
    pub session: SessionConfig,
    /// NPC prompt catalogue.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl UmiConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `UmiError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::UmiError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level or `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"pretty"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Masking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// When false, SAY text is returned verbatim.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Marker substituted for hidden tokens.
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            marker: default_marker(),
            seed: None,
        }
    }
}

/// Text-generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "mock", "none".
    #[serde(default = "default_mock")]
    pub provider: String,
    /// Base URL for the HTTP API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token for OpenAI-compatible servers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Timeout for one HTTP attempt in milliseconds. A turn waits for at
    /// most `max_retries + 1` attempts before using the mock reply.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_2")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_mock(),
            base_url: default_ollama_url(),
            model: default_model(),
            api_key: None,
            request_timeout_ms: 5000,
            max_retries: 2,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Session storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database path when `backend = "sqlite"`.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Enable SQLite WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 of each session blob.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Chat lines kept per NPC (oldest dropped first).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Player stats for a fresh session.
    #[serde(default)]
    pub initial_player: PlayerStats,
    /// NPC stats used where a catalogue entry leaves a value unset.
    #[serde(default)]
    pub default_npc: NpcStats,
}

impl SessionConfig {
    /// State a never-seen session starts from.
    #[must_use]
    pub fn template(&self) -> SessionState {
        SessionState::new(self.initial_player)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
            wal_mode: true,
            checksum_enabled: true,
            max_history: default_max_history(),
            initial_player: PlayerStats::default(),
            default_npc: NpcStats::default(),
        }
    }
}

/// Prompt catalogue location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// TOML catalogue replacing the built-in NPCs.
    #[serde(default)]
    pub npc_file: Option<PathBuf>,
}

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_marker() -> String { DEFAULT_MASK_MARKER.to_string() }
fn default_mock() -> String { "mock".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:3b".to_string() }
fn default_5000() -> u64 { 5000 }
fn default_2() -> u32 { 2 }
fn default_temperature() -> f32 { 0.8 }
fn default_max_tokens() -> u32 { 400 }
fn default_backend() -> String { "memory".to_string() }
fn default_sqlite_path() -> PathBuf { PathBuf::from("umi_sessions.db") }
fn default_max_history() -> usize { 40 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = UmiConfig::from_toml("").expect("parse");
        assert!(config.masking.enabled);
        assert_eq!(config.masking.marker, DEFAULT_MASK_MARKER);
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.session.backend, "memory");
        assert_eq!(config.session.initial_player, PlayerStats::default());
        assert!(config.prompts.npc_file.is_none());
    }

    #[test]
    fn sections_override() {
        let config = UmiConfig::from_toml(
            r#"
            [general]
            log_format = "json"

            [masking]
            enabled = false
            marker = "blub"
            seed = 42

            [llm]
            provider = "ollama"
            request_timeout_ms = 250

            [session]
            backend = "sqlite"
            max_history = 3

            [session.initial_player]
            hp = 80
            umiLevel = 10
            fishLevel = 20
            "#,
        )
        .expect("parse");

        assert_eq!(config.general.log_format, "json");
        assert!(!config.masking.enabled);
        assert_eq!(config.masking.seed, Some(42));
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.request_timeout_ms, 250);
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.session.max_history, 3);
        assert_eq!(config.session.template().player, PlayerStats::new(80, 10, 20));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = UmiConfig::from_toml("[masking]\nenabled = \"maybe\"").expect_err("invalid");
        assert!(matches!(err, crate::UmiError::Config(_)));
    }
}
