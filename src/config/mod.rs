//! Configuration reading and resolved live settings.

pub mod paths;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::live::gating::{SuppressionPolicy, DEFAULT_ANSWERING_TIMEOUT};
use paths::get_data_dir;

/// Default realtime endpoint (bidi generate-content websocket).
const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default realtime model and voice.
const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
const DEFAULT_VOICE: &str = "Zephyr";

/// Fallback system instruction when the config file does not provide
/// one. The instruction content is opaque to this core.
const DEFAULT_INSTRUCTION: &str = "You are a live interview copilot. Listen \
continuously, detect interviewer questions, and stream a concise spoken \
answer for the candidate. Finish the current answer before starting a new \
one; start each new answer as a separate block.";

/// copilot_config.json shape (written by the UI shell's settings panel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default)]
    pub answering_timeout_ms: Option<u64>,
    /// "mute" (default) or "sampled".
    #[serde(default)]
    pub suppression_policy: Option<String>,
    #[serde(default)]
    pub suppression_permille: Option<u16>,
    #[serde(default)]
    pub suppression_seed: Option<u64>,
}

/// Resolved settings with defaults applied. Everything the session
/// controller needs at start.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub input_device: Option<String>,
    pub answering_timeout: Duration,
    pub suppression: SuppressionPolicy,
    pub suppression_seed: u64,
}

impl LiveSettings {
    pub fn from_config(cfg: CopilotConfig) -> Self {
        let suppression = match cfg.suppression_policy.as_deref() {
            Some("sampled") => SuppressionPolicy::Sampled {
                permille: cfg.suppression_permille.unwrap_or(150).min(1000),
            },
            Some("mute") | None => SuppressionPolicy::Mute,
            Some(other) => {
                warn!("Unknown suppression policy {other:?}, using mute");
                SuppressionPolicy::Mute
            }
        };
        Self {
            api_key: cfg
                .api_key
                .or_else(|| std::env::var("GEMINI_API_KEY").ok()),
            endpoint: cfg.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: cfg.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: cfg.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            system_instruction: cfg
                .system_instruction
                .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string()),
            input_device: cfg.input_device,
            answering_timeout: cfg
                .answering_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_ANSWERING_TIMEOUT),
            suppression,
            suppression_seed: cfg.suppression_seed.unwrap_or(0),
        }
    }
}

/// Read copilot_config.json from the data directory.
pub fn read_copilot_config() -> CopilotConfig {
    let path = get_config_path();
    read_json_file(&path).unwrap_or_default()
}

/// Path to copilot_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("copilot_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let settings = LiveSettings::from_config(CopilotConfig::default());
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.voice, DEFAULT_VOICE);
        assert_eq!(settings.answering_timeout, DEFAULT_ANSWERING_TIMEOUT);
        assert_eq!(settings.suppression, SuppressionPolicy::Mute);
    }

    #[test]
    fn sampled_policy_is_read_and_clamped() {
        let cfg = CopilotConfig {
            suppression_policy: Some("sampled".into()),
            suppression_permille: Some(2_000),
            ..Default::default()
        };
        let settings = LiveSettings::from_config(cfg);
        assert_eq!(
            settings.suppression,
            SuppressionPolicy::Sampled { permille: 1000 }
        );
    }

    #[test]
    fn unknown_policy_falls_back_to_mute() {
        let cfg = CopilotConfig {
            suppression_policy: Some("whisper".into()),
            ..Default::default()
        };
        assert_eq!(
            LiveSettings::from_config(cfg).suppression,
            SuppressionPolicy::Mute
        );
    }

    #[test]
    fn config_json_round_trips() {
        let json = r#"{"apiKey":"k","answeringTimeoutMs":8000,"voice":"Puck"}"#;
        let cfg: CopilotConfig = serde_json::from_str(json).unwrap();
        let settings = LiveSettings::from_config(cfg);
        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.answering_timeout, Duration::from_millis(8_000));
        assert_eq!(settings.voice, "Puck");
    }
}
