//! PCM transport encoding.
//!
//! The realtime channel carries microphone audio as base64-encoded 16-bit
//! signed little-endian PCM, mono at 16 kHz. This is the one bit-exact
//! contract the core owns, so the conversion lives here with tests.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

/// MIME type attached to every outbound audio chunk.
pub const PCM_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Convert f32 samples in [-1.0, 1.0] to 16-bit LE PCM bytes.
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let pcm = (clamped * 32767.0) as i16;
        out.extend_from_slice(&pcm.to_le_bytes());
    }
    out
}

/// Encode a frame of f32 samples as base64 PCM16 for the realtime channel.
pub fn encode_frame_base64(samples: &[f32]) -> String {
    B64.encode(f32_to_pcm16_bytes(samples))
}
