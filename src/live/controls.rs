//! Mode/control surface: user-toggleable session configuration.
//!
//! Holds the live mode, per-party mic flags (standard mode), and the
//! floating interviewer button (you-and-me mode). Lives for the app's
//! lifetime, independent of any session; the session snapshots it at
//! start and pushes incremental changes as control text while active.

use serde::{Deserialize, Serialize};

/// Which live variant the user selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LiveMode {
    /// Audio streams whenever a party's mic flag is active.
    Standard,
    /// Audio streams only while the floating interviewer button is
    /// in `Listening` state.
    YouAndMe,
}

/// Floating interviewer button state (you-and-me mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    Idle,
    Listening,
}

/// Which party a mic flag belongs to (standard mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Interviewer,
    Candidate,
}

/// The full user-facing control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeConfig {
    pub live_mode: LiveMode,
    pub interviewer_mic: bool,
    pub candidate_mic: bool,
    pub button: ButtonState,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            live_mode: LiveMode::Standard,
            interviewer_mic: false,
            candidate_mic: false,
            button: ButtonState::Idle,
        }
    }
}

impl ModeConfig {
    /// Switch the live mode. Flags carry over untouched; gating re-reads
    /// them under the new mode on the next frame.
    pub fn set_mode(&mut self, mode: LiveMode) {
        self.live_mode = mode;
    }

    /// Set one party's mic flag. In standard mode the flags are mutually
    /// exclusive: enabling one clears the other before any control
    /// message is built.
    pub fn set_mic_flag(&mut self, party: Party, active: bool) {
        match party {
            Party::Interviewer => {
                self.interviewer_mic = active;
                if active {
                    self.candidate_mic = false;
                }
            }
            Party::Candidate => {
                self.candidate_mic = active;
                if active {
                    self.interviewer_mic = false;
                }
            }
        }
    }

    /// Flip the floating interviewer button and return its new state.
    pub fn toggle_button(&mut self) -> ButtonState {
        self.button = match self.button {
            ButtonState::Idle => ButtonState::Listening,
            ButtonState::Listening => ButtonState::Idle,
        };
        self.button
    }

    /// Reset the transient per-session toggles (called on session start
    /// and stop; the selected live mode itself persists).
    pub fn reset_session_toggles(&mut self) {
        self.interviewer_mic = false;
        self.candidate_mic = false;
        self.button = ButtonState::Idle;
    }

    /// Serialize the current flag set as an out-of-band control message
    /// for the realtime channel. The wording matches what the model's
    /// instruction block expects.
    pub fn control_message(&self) -> String {
        match self.live_mode {
            LiveMode::Standard => format!(
                "System Update: interviewer_button={}, candidate_button={}. Mode: Standard.",
                self.interviewer_mic, self.candidate_mic
            ),
            LiveMode::YouAndMe => format!(
                "System Update: interviewer_button={}. Mode: You-Me.",
                match self.button {
                    ButtonState::Idle => "idle",
                    ButtonState::Listening => "listening",
                }
            ),
        }
    }

    /// Render the flag block appended to the system instruction at
    /// session start.
    pub fn instruction_flags(&self) -> String {
        format!(
            "Current app flags:\n\
             - live_mode: \"{}\"\n\
             - interviewer_button: \"{}\"\n\
             - interviewer_mic_active: {}\n\
             - candidate_mic_active: {}",
            match self.live_mode {
                LiveMode::Standard => "off",
                LiveMode::YouAndMe => "live_by_you_me",
            },
            match self.button {
                ButtonState::Idle => "idle",
                ButtonState::Listening => "listening",
            },
            self.interviewer_mic,
            self.candidate_mic,
        )
    }
}
