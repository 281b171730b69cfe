//! Live copilot session controller.
//!
//! One `Session` owns one microphone capture handle and one realtime
//! connection for its lifetime. It is driven cooperatively from the main
//! loop by three event sources: UI commands, the frame pump tick, and
//! incoming realtime events. Stopping releases the capture handle
//! synchronously; resource release is never gated on the remote close
//! handshake.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::level::LevelMeter;
use crate::audio::{self, pcm, AudioConsumer, CaptureHandle, FRAME_SAMPLES};
use crate::config::LiveSettings;

use super::client::{self, LiveEvent, Outbound, RealtimeConfig, SessionHandle};
use super::controls::ModeConfig;
use super::gating::GatingController;
use super::history::TranscriptHistory;

/// Placeholder shown while waiting for the first model output.
pub const READY_PLACEHOLDER: &str = "Ready to assist. Listening to your interview...";

/// Sealed marker appended when the user stops the session.
pub const STOPPED_MARKER: &str = "Copilot session stopped.";

/// How long the interviewer-speaking indicator stays lit after an input
/// transcription delta.
const INTERVIEWER_SPEAKING_HOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    Error,
}

pub struct Session {
    status: SessionStatus,
    capture: Option<CaptureHandle>,
    consumer: Option<AudioConsumer>,
    handle: Option<SessionHandle>,
    gating: GatingController,
    history: TranscriptHistory,
    /// Samples drained from the ring buffer but not yet a full frame.
    pending: Vec<f32>,
    interviewer_speaking_until: Option<Instant>,
}

impl Session {
    pub fn new(settings: &LiveSettings) -> Self {
        Self {
            status: SessionStatus::Idle,
            capture: None,
            consumer: None,
            handle: None,
            gating: GatingController::new(
                settings.answering_timeout,
                settings.suppression,
                settings.suppression_seed,
            ),
            history: TranscriptHistory::new(),
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
            interviewer_speaking_until: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    fn is_running(&self) -> bool {
        matches!(self.status, SessionStatus::Connecting | SessionStatus::Active)
    }

    /// Start a new session: acquire the microphone, connect the realtime
    /// channel, reset transcript state.
    ///
    /// Returns `Ok(None)` if a session is already running (start requests
    /// are ignored while active). On failure the microphone is released
    /// and the error is surfaced; there is no automatic retry.
    pub async fn start(
        &mut self,
        settings: &LiveSettings,
        controls: &mut ModeConfig,
    ) -> anyhow::Result<Option<mpsc::UnboundedReceiver<LiveEvent>>> {
        if self.is_running() {
            warn!("start_session ignored: session already running");
            return Ok(None);
        }

        let Some(api_key) = settings.api_key.as_deref() else {
            self.status = SessionStatus::Error;
            anyhow::bail!("no API key configured");
        };

        controls.reset_session_toggles();
        self.gating = GatingController::new(
            settings.answering_timeout,
            settings.suppression,
            settings.suppression_seed,
        );
        self.history = TranscriptHistory::new();
        self.history.push_placeholder(READY_PLACEHOLDER);
        self.pending.clear();
        self.interviewer_speaking_until = None;

        // Microphone first: acquisition failure is fatal to session start
        // and must not leave a half-open connection behind.
        let (producer, consumer) = audio::audio_ring_buffer(None);
        let meter = LevelMeter::new();
        let capture =
            match audio::start_capture(producer, meter, settings.input_device.as_deref()) {
                Ok(handle) => handle,
                Err(e) => {
                    self.status = SessionStatus::Error;
                    self.history.push_notice(format!("Error: {e}"));
                    return Err(e.into());
                }
            };

        self.status = SessionStatus::Connecting;

        let realtime_config = RealtimeConfig {
            model: settings.model.clone(),
            voice: settings.voice.clone(),
            system_instruction: format!(
                "{}\n\n{}",
                settings.system_instruction,
                controls.instruction_flags()
            ),
            input_transcription: true,
            output_transcription: true,
        };

        match client::connect(&settings.endpoint, api_key, &realtime_config).await {
            Ok((handle, events)) => {
                self.capture = Some(capture);
                self.consumer = Some(consumer);
                self.handle = Some(handle);
                info!("Session connecting");
                Ok(Some(events))
            }
            Err(e) => {
                drop(capture); // releases the microphone
                self.status = SessionStatus::Error;
                self.history
                    .push_notice("Error: Live session failed. Check connection and API key.");
                Err(e)
            }
        }
    }

    /// Stop the session. The capture handle is released first and
    /// unconditionally — even if the remote close handshake never
    /// completes, the microphone goes dark now.
    pub fn stop(&mut self) {
        self.release_resources();
        if self.status != SessionStatus::Idle {
            self.history.push_notice(STOPPED_MARKER);
        }
        self.status = SessionStatus::Idle;
        info!("Session stopped");
    }

    fn release_resources(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
        self.consumer = None;
        // Dropping the handle ends the writer task, which closes the
        // websocket in the background.
        self.handle = None;
        self.pending.clear();
        self.gating.reset();
        self.interviewer_speaking_until = None;
    }

    /// Apply one incoming realtime event. Returns `true` if presentation
    /// state changed.
    pub fn handle_live_event(&mut self, event: LiveEvent, now: Instant) -> bool {
        match event {
            LiveEvent::Opened => {
                self.status = SessionStatus::Active;
                info!("Session active");
                true
            }
            LiveEvent::InputTranscriptionDelta(_) => {
                self.interviewer_speaking_until = Some(now + INTERVIEWER_SPEAKING_HOLD);
                true
            }
            LiveEvent::OutputTranscriptionDelta(text) => {
                self.gating.on_output_event(now);
                self.history.on_delta(&text);
                true
            }
            LiveEvent::TurnComplete => {
                self.gating.on_turn_complete();
                self.history.on_turn_complete();
                true
            }
            LiveEvent::TransportError { message, transient } => {
                if transient {
                    // Advisory only: the session continues.
                    self.history.push_notice(format!("System: {message}"));
                } else {
                    warn!("Fatal transport error, tearing session down: {message}");
                    self.release_resources();
                    self.status = SessionStatus::Error;
                    self.history.push_notice(format!("Error: {message}"));
                }
                true
            }
            LiveEvent::Closed => {
                if self.is_running() {
                    self.release_resources();
                    self.status = SessionStatus::Idle;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drain captured samples, cut them into frames, and forward every
    /// admitted frame. The admission decision is recomputed per frame
    /// against the current mode/flags/phase.
    pub fn pump_frames(&mut self, controls: &ModeConfig) {
        let Some(consumer) = self.consumer.as_mut() else {
            return;
        };
        if consumer.available() == 0 {
            return;
        }
        let mut buf = [0.0f32; FRAME_SAMPLES];
        loop {
            let n = consumer.pop_slice(&mut buf);
            if n == 0 {
                break;
            }
            self.pending.extend_from_slice(&buf[..n]);
            while self.pending.len() >= FRAME_SAMPLES {
                let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
                if self.gating.should_admit(controls) {
                    if let Some(handle) = &self.handle {
                        handle.send(Outbound::Media {
                            data: pcm::encode_frame_base64(&frame),
                            mime_type: pcm::PCM_MIME_TYPE.to_string(),
                        });
                    }
                }
            }
            if n < buf.len() {
                break;
            }
        }
    }

    /// Push the current control flags to the live session, if any.
    pub fn push_control(&self, controls: &ModeConfig) {
        if self.is_running() {
            if let Some(handle) = &self.handle {
                handle.send(Outbound::Text(controls.control_message()));
            }
        }
    }

    /// Deadline for the answering-timeout fallback, if armed.
    pub fn answering_deadline(&self) -> Option<Instant> {
        self.gating.deadline()
    }

    /// Fire the answering-timeout fallback. Returns `true` if the phase
    /// reverted.
    pub fn on_answering_timeout(&mut self, now: Instant) -> bool {
        self.gating.poll_timeout(now)
    }

    pub fn navigate_by(&mut self, delta: i64) {
        self.history.navigate_by(delta);
    }

    pub fn navigate_to(&mut self, index: usize) {
        self.history.navigate_to(index);
    }

    /// Current presentation state.
    pub fn snapshot(&self, now: Instant) -> crate::ipc::CopilotEvent {
        crate::ipc::CopilotEvent::Snapshot {
            status: self.status,
            current_turn_text: self.history.current().to_string(),
            history_length: self.history.len(),
            cursor_index: self.history.cursor(),
            audio_level: self.capture.as_ref().map(|c| c.level()).unwrap_or(0),
            interviewer_speaking: self
                .interviewer_speaking_until
                .map(|until| now < until)
                .unwrap_or(false),
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &TranscriptHistory {
        &self.history
    }

    /// Put the session into a running state without hardware or network,
    /// for teardown and pump tests.
    #[cfg(test)]
    pub fn test_activate(
        &mut self,
        capture: CaptureHandle,
        consumer: Option<AudioConsumer>,
        handle: Option<SessionHandle>,
    ) {
        self.capture = Some(capture);
        self.consumer = consumer;
        self.handle = handle;
        self.status = SessionStatus::Active;
        self.history.push_placeholder(READY_PLACEHOLDER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopilotConfig;
    use crate::live::client::test_session_handle;
    use crate::live::controls::Party;
    use crate::live::gating::Phase;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn settings() -> LiveSettings {
        LiveSettings::from_config(CopilotConfig::default())
    }

    fn active_session() -> (Session, Arc<AtomicBool>) {
        let probe = Arc::new(AtomicBool::new(false));
        let mut session = Session::new(&settings());
        session.test_activate(CaptureHandle::test_stub(probe.clone()), None, None);
        (session, probe)
    }

    #[test]
    fn output_deltas_accumulate_and_seal_on_turn_complete() {
        let (mut session, _) = active_session();
        let now = Instant::now();

        session.handle_live_event(LiveEvent::OutputTranscriptionDelta("Hello".into()), now);
        session.handle_live_event(
            LiveEvent::OutputTranscriptionDelta(" world".into()),
            now + Duration::from_millis(100),
        );
        assert_eq!(session.gating.phase(), Phase::Answering);

        session.handle_live_event(LiveEvent::TurnComplete, now + Duration::from_millis(200));
        assert_eq!(session.gating.phase(), Phase::Listening);

        // Placeholder was replaced by the streamed turn.
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().current(), "Hello world");
    }

    #[test]
    fn stop_releases_capture_even_with_hung_close() {
        let (mut session, probe) = active_session();
        // No Closed event will ever arrive for this session.
        session.stop();

        assert!(probe.load(Ordering::SeqCst), "capture was not released");
        assert!(session.capture.is_none());
        assert_eq!(session.status(), SessionStatus::Idle);
        // The stop marker is sealed and visible.
        assert_eq!(session.history().current(), STOPPED_MARKER);
    }

    #[test]
    fn fatal_transport_error_tears_down_and_releases() {
        let (mut session, probe) = active_session();
        session.handle_live_event(
            LiveEvent::TransportError {
                message: "connection reset".into(),
                transient: false,
            },
            Instant::now(),
        );
        assert!(probe.load(Ordering::SeqCst));
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[test]
    fn transient_transport_error_keeps_session_running() {
        let (mut session, probe) = active_session();
        session.handle_live_event(
            LiveEvent::TransportError {
                message: "rate limit".into(),
                transient: true,
            },
            Instant::now(),
        );
        assert!(!probe.load(Ordering::SeqCst));
        assert_eq!(session.status(), SessionStatus::Active);
        // Advisory appended inline, display not interrupted.
        assert_eq!(session.history().current(), "System: rate limit");
    }

    #[test]
    fn remote_close_returns_session_to_idle() {
        let (mut session, probe) = active_session();
        session.handle_live_event(LiveEvent::Closed, Instant::now());
        assert!(probe.load(Ordering::SeqCst));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn pump_forwards_only_admitted_frames() {
        let probe = Arc::new(AtomicBool::new(false));
        let (mut producer, consumer) = audio::audio_ring_buffer(Some(FRAME_SAMPLES * 4));
        let (handle, mut out_rx) = test_session_handle();

        let mut session = Session::new(&settings());
        session.test_activate(
            CaptureHandle::test_stub(probe),
            Some(consumer),
            Some(handle),
        );

        let mut controls = ModeConfig::default();
        let frame = vec![0.25f32; FRAME_SAMPLES];

        // No mic flag active: the frame is gated out.
        producer.push_slice(&frame);
        session.pump_frames(&controls);
        assert!(out_rx.try_recv().is_err());

        // Enable a mic flag: the identical frame is admitted and encoded.
        controls.set_mic_flag(Party::Interviewer, true);
        producer.push_slice(&frame);
        session.pump_frames(&controls);
        match out_rx.try_recv() {
            Ok(Outbound::Media { data, mime_type }) => {
                assert_eq!(mime_type, pcm::PCM_MIME_TYPE);
                assert_eq!(data, pcm::encode_frame_base64(&frame));
            }
            other => panic!("expected media chunk, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_reflects_history_and_status() {
        let (mut session, _) = active_session();
        let now = Instant::now();
        session.handle_live_event(LiveEvent::OutputTranscriptionDelta("Hi".into()), now);

        match session.snapshot(now) {
            crate::ipc::CopilotEvent::Snapshot {
                status,
                current_turn_text,
                history_length,
                cursor_index,
                ..
            } => {
                assert_eq!(status, SessionStatus::Active);
                assert_eq!(current_turn_text, "Hi");
                assert_eq!(history_length, 1);
                assert_eq!(cursor_index, 0);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }
}
