//! Turn & gating controller.
//!
//! Two orthogonal axes decide what happens to each captured frame:
//!
//! - **Mode axis** (user-driven): in standard mode a frame is admitted
//!   whenever either party's mic flag is active; in you-and-me mode only
//!   while the floating interviewer button is `Listening`.
//! - **Phase axis** (remote-driven): `Listening` → `Answering` on the
//!   first output-transcription delta of a turn, back to `Listening` on
//!   turn-complete or after an inactivity timeout. The timeout guards
//!   against a remote turn-complete signal that never arrives and is
//!   reset on every output event.
//!
//! The admission decision is recomputed per frame from current state, so
//! a mode flip mid-stream affects the very next frame. At most one frame
//! captured under the old configuration may already be in flight; that
//! race is accepted.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::controls::{ButtonState, LiveMode, ModeConfig};

/// Default `Answering` → `Listening` fallback when no turn-complete
/// arrives. Matches the silence window the remote model exhibits between
/// answer chunks.
pub const DEFAULT_ANSWERING_TIMEOUT: Duration = Duration::from_millis(7_000);

/// Whether the session is currently emitting an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Listening,
    Answering,
}

/// What to do with captured frames while the model is answering. Gating
/// is advisory (it reduces the model hearing its own answer echoed
/// back), not a hard mute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionPolicy {
    /// Suppress every frame while answering. The default.
    Mute,
    /// Forward roughly `permille`/1000 of frames to retain ambient
    /// context. The exact fraction is a tunable, not load-bearing.
    Sampled { permille: u16 },
}

/// Pure mode-axis decision: does the current configuration allow audio
/// to stream at all?
pub fn mode_allows(config: &ModeConfig) -> bool {
    match config.live_mode {
        LiveMode::Standard => config.interviewer_mic || config.candidate_mic,
        LiveMode::YouAndMe => config.button == ButtonState::Listening,
    }
}

/// Authoritative phase state. The frame pump asks this controller per
/// frame; nothing else caches an admission decision.
pub struct GatingController {
    phase: Phase,
    deadline: Option<Instant>,
    timeout: Duration,
    policy: SuppressionPolicy,
    rng: StdRng,
}

impl GatingController {
    pub fn new(timeout: Duration, policy: SuppressionPolicy, seed: u64) -> Self {
        Self {
            phase: Phase::Listening,
            deadline: None,
            timeout,
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Deadline for the answering-timeout fallback, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// An output-transcription delta arrived: enter (or stay in)
    /// `Answering` and re-arm the inactivity fallback.
    pub fn on_output_event(&mut self, now: Instant) {
        if self.phase != Phase::Answering {
            debug!("phase: listening -> answering");
        }
        self.phase = Phase::Answering;
        self.deadline = Some(now + self.timeout);
    }

    /// Explicit turn-complete from the remote: back to `Listening`.
    pub fn on_turn_complete(&mut self) {
        if self.phase != Phase::Listening {
            debug!("phase: answering -> listening (turn complete)");
        }
        self.phase = Phase::Listening;
        self.deadline = None;
    }

    /// Check the inactivity fallback. Returns `true` if the phase
    /// reverted to `Listening` because the deadline passed.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                debug!("phase: answering -> listening (inactivity timeout)");
                self.phase = Phase::Listening;
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Reset to listening (session stop / teardown).
    pub fn reset(&mut self) {
        self.phase = Phase::Listening;
        self.deadline = None;
    }

    /// Per-frame admission decision. Re-reads current mode, flags, and
    /// phase on every call; never cached.
    pub fn should_admit(&mut self, config: &ModeConfig) -> bool {
        if !mode_allows(config) {
            return false;
        }
        if self.phase == Phase::Answering {
            return match self.policy {
                SuppressionPolicy::Mute => false,
                SuppressionPolicy::Sampled { permille } => {
                    self.rng.gen_range(0..1000u16) < permille
                }
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::controls::Party;

    fn controller(policy: SuppressionPolicy) -> GatingController {
        GatingController::new(DEFAULT_ANSWERING_TIMEOUT, policy, 42)
    }

    fn standard_active() -> ModeConfig {
        let mut cfg = ModeConfig::default();
        cfg.set_mic_flag(Party::Interviewer, true);
        cfg
    }

    #[test]
    fn admission_is_pure_given_fixed_state() {
        let mut gate = controller(SuppressionPolicy::Mute);
        let cfg = standard_active();
        let first = gate.should_admit(&cfg);
        for _ in 0..100 {
            assert_eq!(gate.should_admit(&cfg), first);
        }
        assert!(first);
    }

    #[test]
    fn no_mic_flag_means_no_admission() {
        let mut gate = controller(SuppressionPolicy::Mute);
        let cfg = ModeConfig::default();
        assert!(!gate.should_admit(&cfg));
    }

    #[test]
    fn you_and_me_gates_on_button() {
        let mut gate = controller(SuppressionPolicy::Mute);
        let mut cfg = ModeConfig::default();
        cfg.set_mode(LiveMode::YouAndMe);

        // Button idle: an arriving frame is not admitted.
        assert!(!gate.should_admit(&cfg));

        // Toggle to listening: the identical frame is admitted.
        cfg.toggle_button();
        assert!(gate.should_admit(&cfg));
    }

    #[test]
    fn mode_flip_is_seen_by_next_frame() {
        let mut gate = controller(SuppressionPolicy::Mute);
        let mut cfg = standard_active();
        assert!(gate.should_admit(&cfg));
        cfg.set_mic_flag(Party::Interviewer, false);
        assert!(!gate.should_admit(&cfg));
    }

    #[test]
    fn answering_suppresses_under_mute_policy() {
        let mut gate = controller(SuppressionPolicy::Mute);
        let cfg = standard_active();
        gate.on_output_event(Instant::now());
        assert_eq!(gate.phase(), Phase::Answering);
        assert!(!gate.should_admit(&cfg));

        gate.on_turn_complete();
        assert_eq!(gate.phase(), Phase::Listening);
        assert!(gate.should_admit(&cfg));
    }

    #[test]
    fn sampled_policy_is_deterministic_for_a_seed() {
        let cfg = standard_active();
        let run = |seed: u64| -> Vec<bool> {
            let mut gate = GatingController::new(
                DEFAULT_ANSWERING_TIMEOUT,
                SuppressionPolicy::Sampled { permille: 150 },
                seed,
            );
            gate.on_output_event(Instant::now());
            (0..200).map(|_| gate.should_admit(&cfg)).collect()
        };
        assert_eq!(run(7), run(7));

        let admitted = run(7).iter().filter(|&&a| a).count();
        // ~15% pass-through; generous bounds, just not all-or-nothing.
        assert!(admitted > 0 && admitted < 100, "admitted {admitted}/200");
    }

    #[test]
    fn inactivity_timeout_reverts_phase() {
        let mut gate = GatingController::new(
            Duration::from_millis(8_000),
            SuppressionPolicy::Mute,
            0,
        );
        let start = Instant::now();
        gate.on_output_event(start);

        // Just before the deadline: still answering.
        assert!(!gate.poll_timeout(start + Duration::from_millis(7_999)));
        assert_eq!(gate.phase(), Phase::Answering);

        // 8001 ms with no turn-complete: auto-revert to listening.
        assert!(gate.poll_timeout(start + Duration::from_millis(8_001)));
        assert_eq!(gate.phase(), Phase::Listening);
    }

    #[test]
    fn output_event_rearms_the_timeout() {
        let mut gate = GatingController::new(
            Duration::from_millis(8_000),
            SuppressionPolicy::Mute,
            0,
        );
        let start = Instant::now();
        gate.on_output_event(start);
        // A new delta mid-turn pushes the deadline out.
        gate.on_output_event(start + Duration::from_millis(6_000));
        assert!(!gate.poll_timeout(start + Duration::from_millis(8_001)));
        assert_eq!(gate.phase(), Phase::Answering);
        assert!(gate.poll_timeout(start + Duration::from_millis(14_001)));
    }
}
