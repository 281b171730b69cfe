//! IPC protocol types for communication with the UI shell.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> shell).
//! Commands use `{"command": "<name>", ...}` format (shell -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::live::controls::{LiveMode, Party};
use crate::live::session::SessionStatus;

// ---------------------------------------------------------------------------
// Events: core -> shell (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the shell via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum CopilotEvent {
    Starting {},
    Ready {},
    /// Full presentation state, re-emitted on every state change.
    Snapshot {
        status: SessionStatus,
        current_turn_text: String,
        history_length: usize,
        cursor_index: usize,
        audio_level: u8,
        interviewer_speaking: bool,
    },
    /// Non-fatal advisory (transient transport errors).
    Notice { message: String },
    Error { message: String },
    AudioDevices { input: Vec<String> },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: shell -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the shell via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum CopilotCommand {
    StartSession {},
    StopSession {},
    SetMode {
        mode: LiveMode,
    },
    SetMicFlag {
        party: Party,
        active: bool,
    },
    ToggleFloatingButton {},
    NavigateHistory {
        #[serde(default)]
        delta: Option<i64>,
        #[serde(default)]
        index: Option<usize>,
    },
    ListAudioDevices {},
    Ping {},
    Stop {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: CopilotCommand =
            serde_json::from_str(r#"{"command":"set_mode","mode":"you-and-me"}"#).unwrap();
        assert!(matches!(
            cmd,
            CopilotCommand::SetMode {
                mode: LiveMode::YouAndMe
            }
        ));

        let cmd: CopilotCommand = serde_json::from_str(
            r#"{"command":"set_mic_flag","party":"interviewer","active":true}"#,
        )
        .unwrap();
        assert!(matches!(
            cmd,
            CopilotCommand::SetMicFlag {
                party: Party::Interviewer,
                active: true
            }
        ));
    }

    #[test]
    fn navigate_accepts_delta_or_index() {
        let cmd: CopilotCommand =
            serde_json::from_str(r#"{"command":"navigate_history","delta":-1}"#).unwrap();
        assert!(matches!(
            cmd,
            CopilotCommand::NavigateHistory {
                delta: Some(-1),
                index: None
            }
        ));

        let cmd: CopilotCommand =
            serde_json::from_str(r#"{"command":"navigate_history","index":3}"#).unwrap();
        assert!(matches!(
            cmd,
            CopilotCommand::NavigateHistory {
                delta: None,
                index: Some(3)
            }
        ));
    }

    #[test]
    fn snapshot_event_serializes_with_tag_and_data() {
        let event = CopilotEvent::Snapshot {
            status: SessionStatus::Active,
            current_turn_text: "Hello".into(),
            history_length: 1,
            cursor_index: 0,
            audio_level: 42,
            interviewer_speaking: false,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["event"], "snapshot");
        assert_eq!(json["data"]["status"], "active");
        assert_eq!(json["data"]["audio_level"], 42);
    }
}
