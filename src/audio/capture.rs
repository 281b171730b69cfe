//! Microphone capture via cpal.
//!
//! Opens the default (or named) input device, captures audio at its native
//! sample rate, resamples to 16 kHz mono f32 if needed, and writes
//! fixed-size frames to a ring buffer for the session's frame pump. Also
//! feeds the shared amplitude meter from the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use thiserror::Error;
use tracing::{error, info};

use super::level::LevelMeter;
use super::ring_buffer::AudioProducer;

/// Target sample rate for the realtime channel.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Frame size in samples (64 ms at 16 kHz). One frame is one admission
/// decision and one outbound media chunk.
pub const FRAME_SAMPLES: usize = 1024;

/// Why microphone acquisition failed. Fatal to session start; surfaced to
/// the user, never retried automatically.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("no usable input device: {0}")]
    DeviceUnavailable(String),
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl CaptureError {
    /// Classify a backend error string. cpal does not expose a dedicated
    /// permission error on every platform, so this falls back to message
    /// inspection.
    fn from_backend_message(msg: String) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
            Self::PermissionDenied(msg)
        } else {
            Self::Backend(msg)
        }
    }
}

/// List available input device names.
pub fn list_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// An open microphone. Dropping (or calling [`CaptureHandle::release`])
/// stops the underlying hardware stream; release must happen on every
/// session exit path so the OS microphone indicator goes dark.
pub struct CaptureHandle {
    stream: Option<Stream>,
    meter: LevelMeter,
    #[cfg(test)]
    release_probe: Option<std::sync::Arc<std::sync::atomic::AtomicBool>>,
}

impl CaptureHandle {
    /// Current amplitude level, 0–100.
    pub fn level(&self) -> u8 {
        self.meter.get()
    }

    /// Stop the hardware stream and close the device. Idempotent.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            info!("Audio capture released");
        }
        self.meter.clear();
        #[cfg(test)]
        if let Some(probe) = &self.release_probe {
            probe.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Handle with no hardware attached, for exercising session teardown.
    #[cfg(test)]
    pub fn test_stub(probe: std::sync::Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self {
            stream: None,
            meter: LevelMeter::new(),
            release_probe: Some(probe),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Resolved info about the audio input we will use.
struct CaptureConfig {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
}

/// Find and configure the input device.
fn resolve_device(device_name: Option<&str>) -> Result<CaptureConfig, CaptureError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| CaptureError::from_backend_message(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("not found: {name}")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());
    info!(device = %dev_name, "Selected input device");

    let default_config = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable(dev_name.clone())
        }
        other => CaptureError::from_backend_message(other.to_string()),
    })?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels,
        "Input device config (will resample to {}Hz mono if needed)",
        TARGET_SAMPLE_RATE,
    );

    Ok(CaptureConfig {
        device,
        stream_config,
        native_rate,
    })
}

/// Simple linear resampler from `from_rate` to `to_rate`.
/// Operates on mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Start microphone capture. The returned handle must stay alive for the
/// session's lifetime and be released on every exit path.
///
/// Audio is resampled to 16 kHz mono, metered, and pushed into the ring
/// buffer producer. `device_name` of `None` uses the system default input.
pub fn start_capture(
    mut producer: AudioProducer,
    meter: LevelMeter,
    device_name: Option<&str>,
) -> Result<CaptureHandle, CaptureError> {
    let cfg = resolve_device(device_name)?;
    let native_rate = cfg.native_rate;
    let channels = cfg.stream_config.channels;
    let needs_resample = native_rate != TARGET_SAMPLE_RATE;
    let needs_downmix = channels > 1;
    let callback_meter = meter.clone();

    let stream = cfg
        .device
        .build_input_stream(
            &cfg.stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };

                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, TARGET_SAMPLE_RATE)
                } else {
                    mono
                };

                callback_meter.update(&resampled);

                let written = producer.push_slice(&resampled);
                if written < resampled.len() {
                    // Ring buffer full — oldest audio is lost and the
                    // frame pump will catch up. Acceptable.
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None, // no timeout
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("device disappeared".into())
            }
            other => CaptureError::from_backend_message(other.to_string()),
        })?;

    stream
        .play()
        .map_err(|e| CaptureError::from_backend_message(e.to_string()))?;

    info!("Audio capture started");

    Ok(CaptureHandle {
        stream: Some(stream),
        meter,
        #[cfg(test)]
        release_probe: None,
    })
}
