//! Realtime session client.
//!
//! Opens the bidirectional websocket to the hosted model, sends encoded
//! audio frames and out-of-band control text, and delivers incoming
//! transcription and lifecycle events. The wire shape follows the
//! provider's bidi-generate-content protocol: one JSON setup frame, then
//! `realtimeInput` frames out and `serverContent` frames in.

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Configuration for one realtime session. The system instruction is
/// opaque to this component.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

/// Outbound traffic: encoded audio or control text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Media { data: String, mime_type: String },
    Text(String),
}

/// Discriminated events delivered from the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Setup acknowledged; the session is live.
    Opened,
    /// The remote heard something (what it transcribed from our audio).
    InputTranscriptionDelta(String),
    /// Partial model reply text.
    OutputTranscriptionDelta(String),
    /// End of one output turn.
    TurnComplete,
    /// Transport-level failure. `transient` errors are advisory; the
    /// session continues. Anything else tears the session down.
    TransportError { message: String, transient: bool },
    /// Remote closed the connection.
    Closed,
}

/// Sender half of an open session. `send` never errors into the caller's
/// frame path: traffic for a session that is gone is dropped with a log.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn send(&self, out: Outbound) {
        if self.tx.send(out).is_err() {
            debug!("send on closed realtime session dropped");
        }
    }
}

/// Classify a transport error message as transient (recoverable notice)
/// or fatal (session teardown).
///
/// The provider does not expose a structured error kind on this channel,
/// so this is a documented message-content heuristic; prefer an explicit
/// kind if one appears in the API.
pub fn is_transient_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    const TRANSIENT_MARKERS: &[&str] = &[
        "rate limit",
        "quota",
        "resource exhausted",
        "overload",
        "temporar",
        "retry",
        "inference",
        "debugonly",
        "429",
    ];
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Parse one server JSON frame into zero or more events.
///
/// A single `serverContent` frame can carry a transcription delta and the
/// turn-complete marker together; the delta belongs to the completing
/// turn, so it is delivered first.
fn parse_server_frame(value: &Value) -> Vec<LiveEvent> {
    let mut events = Vec::new();

    if value.get("setupComplete").is_some() {
        events.push(LiveEvent::Opened);
        return events;
    }

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("realtime error")
            .to_string();
        let transient = is_transient_error(&message);
        events.push(LiveEvent::TransportError { message, transient });
        return events;
    }

    if let Some(content) = value.get("serverContent") {
        if let Some(text) = content
            .get("inputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|t| t.as_str())
        {
            events.push(LiveEvent::InputTranscriptionDelta(text.to_string()));
        }
        if let Some(text) = content
            .get("outputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|t| t.as_str())
        {
            events.push(LiveEvent::OutputTranscriptionDelta(text.to_string()));
        }
        if content
            .get("turnComplete")
            .and_then(|t| t.as_bool())
            .unwrap_or(false)
        {
            events.push(LiveEvent::TurnComplete);
        }
    }

    events
}

/// Build the one-time setup frame.
fn setup_frame(config: &RealtimeConfig) -> Value {
    let mut setup = json!({
        "model": format!("models/{}", config.model),
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.voice } }
            }
        },
        "systemInstruction": { "parts": [{ "text": config.system_instruction }] },
    });
    if config.input_transcription {
        setup["inputAudioTranscription"] = json!({});
    }
    if config.output_transcription {
        setup["outputAudioTranscription"] = json!({});
    }
    json!({ "setup": setup })
}

/// Serialize one outbound item as a `realtimeInput` frame.
fn outbound_frame(out: &Outbound) -> Value {
    match out {
        Outbound::Media { data, mime_type } => json!({
            "realtimeInput": {
                "mediaChunks": [{ "mimeType": mime_type, "data": data }]
            }
        }),
        Outbound::Text(text) => json!({
            "realtimeInput": { "text": text }
        }),
    }
}

/// Connect to the realtime endpoint and spawn the reader/writer tasks.
///
/// Returns the send handle and the event stream. The reader task ends
/// with a `Closed` event (remote close or stream end) or a fatal
/// `TransportError`; transient errors are reported without ending the
/// stream.
pub async fn connect(
    endpoint: &str,
    api_key: &str,
    config: &RealtimeConfig,
) -> anyhow::Result<(SessionHandle, mpsc::UnboundedReceiver<LiveEvent>)> {
    let url = format!("{endpoint}?key={api_key}");
    let (ws, _response) = connect_async(url.as_str())
        .await
        .context("realtime websocket connect failed")?;
    info!(model = %config.model, "Realtime session connecting");

    let (mut sink, mut stream) = ws.split();

    let setup = setup_frame(config);
    sink.send(Message::Text(setup.to_string()))
        .await
        .context("failed to send realtime setup frame")?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<LiveEvent>();

    // Writer: serialize outbound items until the handle is dropped or the
    // socket rejects a send.
    tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            let frame = outbound_frame(&out).to_string();
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!("realtime send failed, stopping writer: {e}");
                break;
            }
        }
        let _ = sink.close().await;
        debug!("realtime writer task exiting");
    });

    // Reader: decode server frames into events.
    tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(txt))) => {
                    forward_frame(txt.as_bytes(), &event_tx);
                }
                Some(Ok(Message::Binary(bin))) => {
                    forward_frame(&bin, &event_tx);
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Realtime session closed by remote");
                    let _ = event_tx.send(LiveEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {} // ping/pong handled by tungstenite
                Some(Err(e)) => {
                    let message = e.to_string();
                    let transient = is_transient_error(&message);
                    error!(transient, "Realtime transport error: {message}");
                    let _ = event_tx.send(LiveEvent::TransportError { message, transient });
                    if !transient {
                        break;
                    }
                }
            }
        }
        debug!("realtime reader task exiting");
    });

    Ok((SessionHandle { tx: out_tx }, event_rx))
}

/// Handle with an inspectable outbound channel, for session tests.
#[cfg(test)]
pub fn test_session_handle() -> (SessionHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionHandle { tx }, rx)
}

/// Parse raw frame bytes as JSON and forward the resulting events.
fn forward_frame(bytes: &[u8], event_tx: &mpsc::UnboundedSender<LiveEvent>) {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => {
            for event in parse_server_frame(&value) {
                if event_tx.send(event).is_err() {
                    return; // session consumer gone
                }
            }
        }
        Err(e) => warn!("Unparseable realtime frame ({} bytes): {e}", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            model: "test-model".into(),
            voice: "Zephyr".into(),
            system_instruction: "instruction".into(),
            input_transcription: true,
            output_transcription: true,
        }
    }

    #[test]
    fn setup_complete_opens_the_session() {
        let frame = json!({ "setupComplete": {} });
        assert_eq!(parse_server_frame(&frame), vec![LiveEvent::Opened]);
    }

    #[test]
    fn transcription_deltas_are_discriminated() {
        let frame = json!({
            "serverContent": {
                "inputTranscription": { "text": "heard" },
                "outputTranscription": { "text": "reply" }
            }
        });
        assert_eq!(
            parse_server_frame(&frame),
            vec![
                LiveEvent::InputTranscriptionDelta("heard".into()),
                LiveEvent::OutputTranscriptionDelta("reply".into()),
            ]
        );
    }

    #[test]
    fn delta_precedes_turn_complete_in_one_frame() {
        let frame = json!({
            "serverContent": {
                "outputTranscription": { "text": "tail" },
                "turnComplete": true
            }
        });
        assert_eq!(
            parse_server_frame(&frame),
            vec![
                LiveEvent::OutputTranscriptionDelta("tail".into()),
                LiveEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn error_frames_are_classified() {
        let frame = json!({ "error": { "message": "Rate limit exceeded, retry later" } });
        assert_eq!(
            parse_server_frame(&frame),
            vec![LiveEvent::TransportError {
                message: "Rate limit exceeded, retry later".into(),
                transient: true,
            }]
        );

        let frame = json!({ "error": { "message": "invalid api key" } });
        assert_eq!(
            parse_server_frame(&frame),
            vec![LiveEvent::TransportError {
                message: "invalid api key".into(),
                transient: false,
            }]
        );
    }

    #[test]
    fn transient_classification_heuristics() {
        assert!(is_transient_error("Quota exhausted for project"));
        assert!(is_transient_error("model overloaded, please retry"));
        assert!(is_transient_error("HTTP 429 from upstream"));
        assert!(!is_transient_error("connection reset by peer"));
        assert!(!is_transient_error("unauthorized"));
    }

    #[test]
    fn setup_frame_respects_transcription_flags() {
        let mut cfg = test_config();
        let frame = setup_frame(&cfg);
        assert_eq!(frame["setup"]["model"], "models/test-model");
        assert!(frame["setup"].get("inputAudioTranscription").is_some());
        assert!(frame["setup"].get("outputAudioTranscription").is_some());

        cfg.input_transcription = false;
        cfg.output_transcription = false;
        let frame = setup_frame(&cfg);
        assert!(frame["setup"].get("inputAudioTranscription").is_none());
        assert!(frame["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn outbound_frames_have_the_wire_shape() {
        let media = outbound_frame(&Outbound::Media {
            data: "AAAA".into(),
            mime_type: "audio/pcm;rate=16000".into(),
        });
        assert_eq!(
            media["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(media["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");

        let text = outbound_frame(&Outbound::Text("System Update: ...".into()));
        assert_eq!(text["realtimeInput"]["text"], "System Update: ...");
    }
}
