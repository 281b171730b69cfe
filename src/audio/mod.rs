//! Audio capture subsystem: cpal input stream, SPSC ring buffer, amplitude
//! metering, and PCM transport encoding.

pub mod capture;
pub mod level;
pub mod pcm;
pub mod ring_buffer;

pub use capture::{list_devices, start_capture, CaptureError, CaptureHandle, FRAME_SAMPLES};
pub use ring_buffer::{audio_ring_buffer, AudioConsumer, AudioProducer};
